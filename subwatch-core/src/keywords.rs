/// Case-insensitive substring matcher over a fixed keyword list.
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    // (as configured, lowercased)
    keywords: Vec<(String, String)>,
}

impl KeywordMatcher {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keywords = keywords
            .into_iter()
            .map(Into::into)
            .map(|k| {
                let lowered = k.to_lowercase();
                (k, lowered)
            })
            .collect();
        Self { keywords }
    }

    pub fn len(&self) -> usize {
        self.keywords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    /// Keywords found in any of `texts`, each reported once, in configured order.
    pub fn matches_any<'a>(&'a self, texts: &[&str]) -> Vec<&'a str> {
        let lowered: Vec<String> = texts
            .iter()
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
            .collect();

        self.keywords
            .iter()
            .filter(|(_, needle)| lowered.iter().any(|hay| hay.contains(needle.as_str())))
            .map(|(original, _)| original.as_str())
            .collect()
    }

    pub fn matches<'a>(&'a self, text: &str) -> Vec<&'a str> {
        self.matches_any(&[text])
    }
}
