//! A MapReduce-compatible inverted index: word -> documents containing it.
//!

use crate::KeyValue;
use itertools::Itertools;

pub fn map(path: &str, contents: &str) -> Vec<KeyValue> {
    contents
        .split(|c: char| !c.is_alphabetic())
        .filter(|s| !s.is_empty())
        .map(|word| word.to_lowercase())
        .unique()
        .map(|word| KeyValue::new(word, path))
        .collect()
}

pub fn reduce(_key: &str, values: &[String]) -> String {
    let docs: Vec<&String> = values.iter().unique().sorted().collect();
    format!("{} {}", docs.len(), docs.iter().join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_emits_each_word_once_per_document() {
        let pairs = map("doc.txt", "to be or not to be");
        let words: Vec<&str> = pairs.iter().map(|kv| kv.key.as_str()).collect();
        assert_eq!(words, vec!["to", "be", "or", "not"]);
        assert!(pairs.iter().all(|kv| kv.value == "doc.txt"));
    }

    #[test]
    fn reduce_counts_and_sorts_documents() {
        let values = vec!["b.txt".to_string(), "a.txt".to_string(), "b.txt".to_string()];
        assert_eq!(reduce("word", &values), "2 a.txt,b.txt");
    }
}
