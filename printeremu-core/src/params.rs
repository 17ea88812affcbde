//! Per-letter parameter scanner
//!
//! Each letter maps independently to an optional signed decimal. The
//! first parsable value of a letter wins; a letter whose value does not
//! parse counts as absent, the way firmware ignores malformed words.

use std::fmt;

const LETTERS: usize = 26;

/// Parameter words of one instruction line
#[derive(Clone, Copy, Default, PartialEq)]
pub struct Params {
    values: [Option<f64>; LETTERS],
    
    /// Letters that appeared at all, with or without a value
    seen: u32,
}

fn slot(letter: char) -> Option<usize> {
    letter
        .is_ascii_alphabetic()
        .then(|| (letter.to_ascii_uppercase() as u8 - b'A') as usize)
}

fn is_number_char(c: char) -> bool {
    c.is_ascii_digit() || matches!(c, '.' | '-' | '+')
}

impl Params {
    /// Scan the text following an instruction code
    pub fn parse(text: &str) -> Self {
        let mut params = Self::default();
        let mut rest = text;
        
        while let Some(c) = rest.chars().next() {
            rest = &rest[c.len_utf8()..];
            
            let Some(index) = slot(c) else { continue };
            params.seen |= 1 << index;
            
            let end = rest.find(|ch: char| !is_number_char(ch)).unwrap_or(rest.len());
            let (word, tail) = rest.split_at(end);
            rest = tail;
            
            if params.values[index].is_none() {
                params.values[index] = word.parse::<f64>().ok().filter(|v| v.is_finite());
            }
        }
        
        params
    }
    
    /// Value of a letter, if present and parsable
    pub fn get(&self, letter: char) -> Option<f64> {
        slot(letter).and_then(|index| self.values[index])
    }
    
    pub fn get_or(&self, letter: char, default: f64) -> f64 {
        self.get(letter).unwrap_or(default)
    }
    
    /// Whether the letter appeared, even without a value
    pub fn has(&self, letter: char) -> bool {
        slot(letter).map_or(false, |index| self.seen & (1 << index) != 0)
    }
    
    pub fn is_empty(&self) -> bool {
        self.seen == 0
    }
}

impl fmt::Debug for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (index, value) in self.values.iter().enumerate() {
            if self.seen & (1 << index) != 0 {
                map.entry(&char::from(b'A' + index as u8), value);
            }
        }
        map.finish()
    }
}
