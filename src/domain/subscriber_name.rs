use unicode_segmentation::UnicodeSegmentation;

const MAX_GRAPHEMES: usize = 256;
const FORBIDDEN_CHARACTERS: [char; 9] = ['/', '(', ')', '{', '}', '"', '<', '>', '\\'];

#[derive(Debug, Clone)]
pub struct SubscriberName(String);

impl SubscriberName {
    pub fn parse(s: &str) -> Result<SubscriberName, String> {
        let s = s.trim();
        if s.is_empty() {
            return Err("subscriber name is empty.".into());
        }
        if s.graphemes(true).count() > MAX_GRAPHEMES {
            return Err(format!("subscriber name is longer than {MAX_GRAPHEMES} characters."));
        }
        if s.chars().any(|c| FORBIDDEN_CHARACTERS.contains(&c)) {
            return Err(format!("`{s}` contains forbidden characters."));
        }
        Ok(Self(s.into()))
    }
}

impl AsRef<str> for SubscriberName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
