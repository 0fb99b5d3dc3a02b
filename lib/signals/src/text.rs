// Text signals: length, substring spans and sentence boundaries
use strata_core::{DataType, Error, Field, Item, Result, Signal, SignalDescriptor, SignalInputType};

pub const TEXT_LENGTH: &str = "text_length";
pub const SUBSTRING_SEARCH: &str = "substring_search";
pub const SENTENCES: &str = "sentences";

/// Character count of a text value.
pub struct TextLength {
    descriptor: SignalDescriptor,
}

impl TextLength {
    pub fn new() -> Self {
        Self {
            descriptor: SignalDescriptor::new(TEXT_LENGTH),
        }
    }

    pub fn create(descriptor: &SignalDescriptor) -> Result<Box<dyn Signal>> {
        Ok(Box::new(Self {
            descriptor: descriptor.clone(),
        }))
    }
}

impl Default for TextLength {
    fn default() -> Self {
        Self::new()
    }
}

impl Signal for TextLength {
    fn name(&self) -> &str {
        TEXT_LENGTH
    }

    fn input_type(&self) -> SignalInputType {
        SignalInputType::Text
    }

    fn fields(&self) -> Field {
        Field::leaf(DataType::Int32)
    }

    fn descriptor(&self) -> SignalDescriptor {
        self.descriptor.clone()
    }

    fn compute(&self, data: &[Item]) -> Result<Vec<Option<Item>>> {
        Ok(data
            .iter()
            .map(|item| item.as_str().map(|text| Item::Int(text.chars().count() as i64)))
            .collect())
    }
}

/// Case-insensitive occurrences of `query`, as spans over the text.
pub struct SubstringSearch {
    descriptor: SignalDescriptor,
    query: String,
}

impl SubstringSearch {
    pub fn new(query: impl Into<String>) -> Result<Self> {
        let query = query.into();
        if query.is_empty() {
            return Err(Error::InvalidConfig(format!(
                "{} needs a non-empty query",
                SUBSTRING_SEARCH
            )));
        }
        Ok(Self {
            descriptor: SignalDescriptor::new(SUBSTRING_SEARCH).with_param("query", query.clone()),
            query,
        })
    }

    pub fn create(descriptor: &SignalDescriptor) -> Result<Box<dyn Signal>> {
        let query = descriptor
            .param_str("query")
            .ok_or_else(|| {
                Error::InvalidConfig(format!("{} requires a \"query\" parameter", SUBSTRING_SEARCH))
            })?;
        let mut signal = Self::new(query)?;
        signal.descriptor = descriptor.clone();
        Ok(Box::new(signal))
    }
}

/// Byte offsets of every non-overlapping, ASCII case-insensitive match of `query` in `text`.
pub fn find_matches(text: &str, query: &str) -> Vec<(usize, usize)> {
    let haystack = text.to_ascii_lowercase();
    let needle = query.to_ascii_lowercase();
    haystack
        .match_indices(needle.as_str())
        .map(|(start, matched)| (start, start + matched.len()))
        .collect()
}

impl Signal for SubstringSearch {
    fn name(&self) -> &str {
        SUBSTRING_SEARCH
    }

    fn input_type(&self) -> SignalInputType {
        SignalInputType::Text
    }

    fn fields(&self) -> Field {
        Field::repeated(Field::leaf(DataType::StringSpan))
    }

    fn descriptor(&self) -> SignalDescriptor {
        self.descriptor.clone()
    }

    fn compute(&self, data: &[Item]) -> Result<Vec<Option<Item>>> {
        data.iter()
            .map(|item| {
                let Some(text) = item.as_str() else {
                    return Ok(None);
                };
                let spans = find_matches(text, &self.query)
                    .into_iter()
                    .map(|(start, end)| span(start, end))
                    .collect::<Result<Vec<_>>>()?;
                Ok(if spans.is_empty() {
                    None
                } else {
                    Some(Item::List(spans))
                })
            })
            .collect()
    }
}

/// Sentence boundaries: a sentence ends at `.`, `!` or `?` followed by whitespace or the end of
/// the text. Spans exclude surrounding whitespace.
pub struct Sentences {
    descriptor: SignalDescriptor,
}

impl Sentences {
    pub fn new() -> Self {
        Self {
            descriptor: SignalDescriptor::new(SENTENCES),
        }
    }

    pub fn create(descriptor: &SignalDescriptor) -> Result<Box<dyn Signal>> {
        Ok(Box::new(Self {
            descriptor: descriptor.clone(),
        }))
    }
}

impl Default for Sentences {
    fn default() -> Self {
        Self::new()
    }
}

/// Byte ranges of the sentences of `text`.
pub fn split_sentences(text: &str) -> Vec<(usize, usize)> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        let at_boundary = chars.peek().map_or(true, |(_, next)| next.is_whitespace());
        if at_boundary {
            let end = i + c.len_utf8();
            push_trimmed(text, start, end, &mut sentences);
            start = end;
        }
    }
    push_trimmed(text, start, text.len(), &mut sentences);
    sentences
}

fn push_trimmed(text: &str, start: usize, end: usize, out: &mut Vec<(usize, usize)>) {
    let slice = &text[start..end];
    let trimmed_start = slice.len() - slice.trim_start().len();
    let trimmed = slice.trim();
    if !trimmed.is_empty() {
        let begin = start + trimmed_start;
        out.push((begin, begin + trimmed.len()));
    }
}

impl Signal for Sentences {
    fn name(&self) -> &str {
        SENTENCES
    }

    fn input_type(&self) -> SignalInputType {
        SignalInputType::Text
    }

    fn fields(&self) -> Field {
        Field::repeated(Field::leaf(DataType::StringSpan))
    }

    fn descriptor(&self) -> SignalDescriptor {
        self.descriptor.clone()
    }

    fn compute(&self, data: &[Item]) -> Result<Vec<Option<Item>>> {
        data.iter()
            .map(|item| {
                let Some(text) = item.as_str() else {
                    return Ok(None);
                };
                let spans = split_sentences(text)
                    .into_iter()
                    .map(|(start, end)| span(start, end))
                    .collect::<Result<Vec<_>>>()?;
                Ok(if spans.is_empty() {
                    None
                } else {
                    Some(Item::List(spans))
                })
            })
            .collect()
    }
}

pub(crate) fn span(start: usize, end: usize) -> Result<Item> {
    let overflow =
        |offset: usize| Error::InvalidSignalOutput(format!("offset {} overflows", offset));
    let start = u32::try_from(start).map_err(|_| overflow(start))?;
    let end = u32::try_from(end).map_err(|_| overflow(end))?;
    Item::span(start, end)
}
