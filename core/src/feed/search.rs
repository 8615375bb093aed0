use cardfeed_proto::LightCard;

/// Free-text filter over the rendered parts of a card: title, summary, tags, process and state.
/// Case-insensitive; every whitespace-separated word must match somewhere.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextSearch {
    words: Vec<String>,
}

impl TextSearch {
    pub fn new(term: &str) -> Self { Self { words: term.split_whitespace().map(str::to_lowercase).collect() } }

    pub fn is_empty(&self) -> bool { self.words.is_empty() }

    pub fn matches(&self, card: &LightCard) -> bool {
        if self.words.is_empty() {
            return true;
        }
        let haystack: Vec<String> = [card.title_translated.as_deref(), card.summary_translated.as_deref(), Some(card.process.as_str()), Some(card.state.as_str())]
            .into_iter()
            .flatten()
            .chain(card.tags.iter().map(String::as_str))
            .map(str::to_lowercase)
            .collect();
        self.words.iter().all(|word| haystack.iter().any(|field| field.contains(word.as_str())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardfeed_proto::Severity;

    #[test]
    fn every_word_must_match_some_field() {
        let card = LightCard::new("c", "u", 0, 0, Severity::Alarm)
            .with_titles("Line overload", "Substation NORTH reports overload")
            .with_tags(["grid"]);
        assert!(TextSearch::new("").matches(&card));
        assert!(TextSearch::new("OVERLOAD north").matches(&card));
        assert!(TextSearch::new("grid line").matches(&card));
        assert!(!TextSearch::new("overload south").matches(&card));
    }
}
