// src/services/zone_manager/natural.rs

use std::cmp::Ordering;

// Ordem "natural" para códigos de posição: V2 antes de V10.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = Chunks::new(a);
    let mut right = Chunks::new(b);

    loop {
        match (left.next(), right.next()) {
            (None, None) => return a.cmp(b), // desempate estável
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = compare_chunk(x, y);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

fn compare_chunk(x: &str, y: &str) -> Ordering {
    let x_digits = x.starts_with(|c: char| c.is_ascii_digit());
    let y_digits = y.starts_with(|c: char| c.is_ascii_digit());

    match (x_digits, y_digits) {
        (true, true) => {
            let xs = x.trim_start_matches('0');
            let ys = y.trim_start_matches('0');
            // Mais dígitos significativos = número maior
            xs.len().cmp(&ys.len()).then_with(|| xs.cmp(ys))
        }
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => x.to_lowercase().cmp(&y.to_lowercase()),
    }
}

// Quebra a string em trechos só de dígitos ou só de não-dígitos.
struct Chunks<'a> {
    rest: &'a str,
}

impl<'a> Chunks<'a> {
    fn new(s: &'a str) -> Self {
        Self { rest: s }
    }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let first = self.rest.chars().next()?;
        let digits = first.is_ascii_digit();
        let end = self
            .rest
            .char_indices()
            .find(|(_, c)| c.is_ascii_digit() != digits)
            .map(|(i, _)| i)
            .unwrap_or(self.rest.len());

        let (chunk, rest) = self.rest.split_at(end);
        self.rest = rest;
        Some(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_sort_by_value() {
        let mut codes = vec!["V1", "V10", "V2"];
        codes.sort_by(|a, b| natural_cmp(a, b));
        assert_eq!(codes, vec!["V1", "V2", "V10"]);
    }

    #[test]
    fn dotted_paths_sort_segment_by_segment() {
        let mut codes = vec!["A.D10.T1.V1", "A.D2.T1.V10", "A.D2.T1.V9", "A.D1.T1.V1"];
        codes.sort_by(|a, b| natural_cmp(a, b));
        assert_eq!(codes, vec!["A.D1.T1.V1", "A.D2.T1.V9", "A.D2.T1.V10", "A.D10.T1.V1"]);
    }

    #[test]
    fn leading_zeros_do_not_inflate_value() {
        assert_eq!(natural_cmp("V007", "V10"), Ordering::Less);
        assert_eq!(natural_cmp("v2", "V10"), Ordering::Less);
        assert_ne!(natural_cmp("V01", "V1"), Ordering::Equal);
    }
}
