//! Splits request text into inference-sized fragments.
//!
//! Fragments are built greedily from whole sentences. A sentence that does not
//! fit on its own is broken at clause punctuation, then at word boundaries.
//! Lengths are counted in `char`s, not bytes, so Turkish and other non-ASCII
//! input gets the same budget as English.

const SENTENCE_TERMINALS: &[char] = &['.', '!', '?', '…'];
const CLAUSE_TERMINALS: &[char] = &[',', ';', ':'];
const OPENERS: &[char] = &['(', '[', '"', '\'', '«', '“'];
const CLOSERS: &[char] = &['"', '\'', ')', ']', '»', '”', '’'];

const ABBREVIATIONS: [&str; 14] = [
    "Dr.", "Mr.", "Mrs.", "Ms.", "Prof.", "etc.", "vs.", "e.g.", "i.e.", "a.m.", "p.m.", "Inc.",
    "Ltd.", "Corp.",
];

/// Split `text` into ordered, non-empty fragments of at most `max_chars` chars.
///
/// Joining the fragments with single spaces yields the input with its
/// whitespace collapsed, unless a single word is longer than `max_chars` and
/// had to be cut. Empty or whitespace-only input yields no fragments.
pub fn split(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut packer = Packer::new(max_chars);

    for sentence in group_words(text.split_whitespace(), ends_sentence) {
        if span_len(&sentence) <= max_chars {
            packer.push(sentence.join(" "));
            continue;
        }

        for clause in group_words(sentence.into_iter(), ends_clause) {
            if span_len(&clause) <= max_chars {
                packer.push(clause.join(" "));
                continue;
            }
            for word in clause {
                if char_len(word) <= max_chars {
                    packer.push(word.to_string());
                } else {
                    for piece in hard_split(word, max_chars) {
                        packer.push(piece);
                    }
                }
            }
        }
    }

    packer.finish()
}

/// Greedy accumulator that closes a fragment when the next unit would overflow.
struct Packer {
    max_chars: usize,
    current: String,
    current_len: usize,
    out: Vec<String>,
}

impl Packer {
    fn new(max_chars: usize) -> Self {
        Self {
            max_chars,
            current: String::new(),
            current_len: 0,
            out: Vec::new(),
        }
    }

    fn push(&mut self, unit: String) {
        let unit_len = char_len(&unit);
        if self.current.is_empty() {
            self.current = unit;
            self.current_len = unit_len;
        } else if self.current_len + 1 + unit_len <= self.max_chars {
            self.current.push(' ');
            self.current.push_str(&unit);
            self.current_len += 1 + unit_len;
        } else {
            self.out.push(std::mem::replace(&mut self.current, unit));
            self.current_len = unit_len;
        }
    }

    fn finish(mut self) -> Vec<String> {
        if !self.current.is_empty() {
            self.out.push(self.current);
        }
        self.out
    }
}

fn group_words<'a, I, F>(words: I, ends_group: F) -> Vec<Vec<&'a str>>
where
    I: Iterator<Item = &'a str>,
    F: Fn(&str) -> bool,
{
    let mut groups = Vec::new();
    let mut current = Vec::new();
    for word in words {
        current.push(word);
        if ends_group(word) {
            groups.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        groups.push(current);
    }
    groups
}

fn ends_sentence(word: &str) -> bool {
    let bare = word.trim_start_matches(OPENERS);
    if ABBREVIATIONS.contains(&bare) {
        return false;
    }
    word.trim_end_matches(CLOSERS)
        .ends_with(SENTENCE_TERMINALS)
}

fn ends_clause(word: &str) -> bool {
    word.trim_end_matches(CLOSERS).ends_with(CLAUSE_TERMINALS)
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Length of the words once joined by single spaces.
fn span_len(words: &[&str]) -> usize {
    words.iter().map(|w| char_len(w)).sum::<usize>() + words.len().saturating_sub(1)
}

/// Last resort for a single word longer than the limit.
fn hard_split(word: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = word.chars().collect();
    chars
        .chunks(max_chars)
        .map(|piece| piece.iter().collect())
        .collect()
}
