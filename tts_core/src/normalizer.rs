//! Turkish text normalization.
//!
//! Spells out percentages, currency amounts, clock times, dates, years,
//! ordinals and plain numbers so the voice model reads them naturally.
//! Special formats go first; plain numbers last.

use std::sync::LazyLock;

use regex::{Captures, Regex};

const ONES: [&str; 10] = [
    "", "bir", "iki", "üç", "dört", "beş", "altı", "yedi", "sekiz", "dokuz",
];
const TENS: [&str; 10] = [
    "", "on", "yirmi", "otuz", "kırk", "elli", "altmış", "yetmiş", "seksen", "doksan",
];
const SCALES: [(u64, &str); 5] = [
    (1_000_000_000_000, "trilyon"),
    (1_000_000_000, "milyar"),
    (1_000_000, "milyon"),
    (1_000, "bin"),
    (100, "yüz"),
];
const MONTHS: [&str; 12] = [
    "ocak", "şubat", "mart", "nisan", "mayıs", "haziran", "temmuz", "ağustos", "eylül", "ekim",
    "kasım", "aralık",
];

static PERCENT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"%(\d+(?:[.,]\d+)?)").unwrap());
static LIRA_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+(?:[.,]\d+)?)\s*(?:₺|TL\b)").unwrap());
static DOLLAR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$(\d+(?:[.,]\d+)?)").unwrap());
static EURO_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"€(\d+(?:[.,]\d+)?)").unwrap());
static POUND_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"£(\d+(?:[.,]\d+)?)").unwrap());
static TIME_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(\d{1,2}):(\d{2})\b").unwrap());
static DATE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})[./](\d{1,2})[./](\d{4})\b").unwrap());
static YEAR_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(?:19|20)\d{2}\b").unwrap());
// A dot followed by a digit is a decimal, not an ordinal.
static ORDINAL_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(\d+)\.(\s|$)").unwrap());
static NUMBER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d+(?:[.,]\d+)?\b").unwrap());
static SPACE_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Normalize Turkish text for synthesis.
pub fn normalize_text(text: &str) -> String {
    let text = PERCENT_REGEX.replace_all(text, |c: &Captures| {
        format!("yüzde {}", spell_decimal(&c[1]))
    });
    let text = LIRA_REGEX.replace_all(&text, |c: &Captures| format!("{} lira", spell_decimal(&c[1])));
    let text = DOLLAR_REGEX.replace_all(&text, |c: &Captures| format!("{} dolar", spell_decimal(&c[1])));
    let text = EURO_REGEX.replace_all(&text, |c: &Captures| format!("{} euro", spell_decimal(&c[1])));
    let text = POUND_REGEX.replace_all(&text, |c: &Captures| format!("{} sterlin", spell_decimal(&c[1])));
    let text = TIME_REGEX.replace_all(&text, |c: &Captures| {
        let hour = spell_digits(&c[1]);
        match c[2].parse::<u64>() {
            Ok(0) => hour,
            _ => format!("{} {}", hour, spell_digits(&c[2])),
        }
    });
    let text = DATE_REGEX.replace_all(&text, |c: &Captures| {
        let month = c[2]
            .parse::<usize>()
            .ok()
            .and_then(|m| m.checked_sub(1))
            .and_then(|m| MONTHS.get(m).copied())
            .map(str::to_string)
            .unwrap_or_else(|| spell_digits(&c[2]));
        format!("{} {} {}", spell_digits(&c[1]), month, spell_digits(&c[3]))
    });
    let text = YEAR_REGEX.replace_all(&text, |c: &Captures| match c[0].parse::<u64>() {
        Ok(year) if (1900..=2100).contains(&year) => number_to_turkish(year),
        _ => c[0].to_string(),
    });
    let text = ORDINAL_REGEX.replace_all(&text, |c: &Captures| match c[1].parse::<u64>() {
        Ok(n) => format!("{}{}", ordinal(n), &c[2]),
        Err(_) => c[0].to_string(),
    });
    let text = NUMBER_REGEX.replace_all(&text, |c: &Captures| spell_decimal(&c[0]));

    SPACE_REGEX.replace_all(&text, " ").trim().to_string()
}

/// Spell a non-negative integer in Turkish.
pub fn number_to_turkish(n: u64) -> String {
    if n == 0 {
        return "sıfır".to_string();
    }
    let mut words: Vec<String> = Vec::new();
    let mut rest = n;

    for (scale, name) in SCALES {
        if rest < scale {
            continue;
        }
        let count = rest / scale;
        rest %= scale;
        // "bin" and "yüz", never "bir bin" / "bir yüz".
        if count > 1 || scale > 1_000 {
            words.push(below_thousand(count));
        }
        words.push(name.to_string());
    }
    if rest > 0 {
        words.push(below_thousand(rest));
    }

    words
        .into_iter()
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn below_thousand(n: u64) -> String {
    if n >= 100 {
        return number_to_turkish(n);
    }
    let tens = TENS[(n / 10) as usize];
    let ones = ONES[(n % 10) as usize];
    [tens, ones]
        .into_iter()
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// "3,14" -> "üç virgül bir dört". Fractional digits are read one by one.
fn spell_decimal(raw: &str) -> String {
    let normalized = raw.replace(',', ".");
    match normalized.split_once('.') {
        Some((int_part, frac_part)) => {
            let digits: Vec<String> = frac_part
                .chars()
                .filter_map(|d| d.to_digit(10))
                .map(|d| number_to_turkish(d as u64))
                .collect();
            format!("{} virgül {}", spell_digits(int_part), digits.join(" "))
        }
        None => spell_digits(raw),
    }
}

/// Spell an integer literal; leaves it untouched if it does not fit in u64.
fn spell_digits(raw: &str) -> String {
    raw.parse::<u64>()
        .map(number_to_turkish)
        .unwrap_or_else(|_| raw.to_string())
}

/// Ordinal form following vowel harmony: birinci, üçüncü, altıncı, dördüncü.
fn ordinal(n: u64) -> String {
    let cardinal = number_to_turkish(n);
    let stem = match cardinal.strip_suffix("dört") {
        Some(prefix) => format!("{prefix}dörd"),
        None => cardinal,
    };
    let last_vowel = stem.chars().rev().find(|c| "aıoueiöü".contains(*c));
    let harmonic = match last_vowel {
        Some('a') | Some('ı') => 'ı',
        Some('e') | Some('i') => 'i',
        Some('o') | Some('u') => 'u',
        Some('ö') | Some('ü') => 'ü',
        _ => 'i',
    };
    let ends_with_vowel = stem.chars().last().is_some_and(|c| "aıoueiöü".contains(c));
    if ends_with_vowel {
        format!("{stem}nc{harmonic}")
    } else {
        format!("{stem}{harmonic}nc{harmonic}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_to_turkish() {
        assert_eq!(number_to_turkish(0), "sıfır");
        assert_eq!(number_to_turkish(7), "yedi");
        assert_eq!(number_to_turkish(42), "kırk iki");
        assert_eq!(number_to_turkish(100), "yüz");
        assert_eq!(number_to_turkish(115), "yüz on beş");
        assert_eq!(number_to_turkish(300), "üç yüz");
        assert_eq!(number_to_turkish(1_000), "bin");
        assert_eq!(number_to_turkish(1_999), "bin dokuz yüz doksan dokuz");
        assert_eq!(number_to_turkish(2026), "iki bin yirmi altı");
        assert_eq!(number_to_turkish(123_456), "yüz yirmi üç bin dört yüz elli altı");
        assert_eq!(number_to_turkish(1_000_000), "bir milyon");
    }

    #[test]
    fn test_ordinals_follow_vowel_harmony() {
        assert_eq!(ordinal(1), "birinci");
        assert_eq!(ordinal(2), "ikinci");
        assert_eq!(ordinal(3), "üçüncü");
        assert_eq!(ordinal(4), "dördüncü");
        assert_eq!(ordinal(6), "altıncı");
        assert_eq!(ordinal(9), "dokuzuncu");
        assert_eq!(ordinal(10), "onuncu");
        assert_eq!(ordinal(50), "ellinci");
    }

    #[test]
    fn test_normalize_percent_and_currency() {
        assert_eq!(normalize_text("%50 indirim"), "yüzde elli indirim");
        assert_eq!(normalize_text("100₺ ödedi"), "yüz lira ödedi");
        assert_eq!(normalize_text("25 TL"), "yirmi beş lira");
        assert_eq!(normalize_text("$3,5"), "üç virgül beş dolar");
        assert_eq!(normalize_text("€20"), "yirmi euro");
    }

    #[test]
    fn test_normalize_time_and_date() {
        assert_eq!(normalize_text("Saat 15:30"), "Saat on beş otuz");
        assert_eq!(normalize_text("Saat 09:00"), "Saat dokuz");
        assert_eq!(
            normalize_text("31.12.2024 tarihinde"),
            "otuz bir aralık iki bin yirmi dört tarihinde"
        );
    }

    #[test]
    fn test_normalize_years_ordinals_and_numbers() {
        assert_eq!(normalize_text("1923 yılında"), "bin dokuz yüz yirmi üç yılında");
        assert_eq!(normalize_text("3. sırada"), "üçüncü sırada");
        assert_eq!(normalize_text("pi 3,14 eder"), "pi üç virgül bir dört eder");
        assert_eq!(normalize_text("  çok   boşluk  "), "çok boşluk");
    }
}
