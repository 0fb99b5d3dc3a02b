// Path algebra: segments, dotted parsing and wildcard matching
use serde::de::{self, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use smallvec::SmallVec;
use std::fmt;

use crate::error::{Error, Result};

/// Schema-level marker for "any element" of a repeated field.
pub const PATH_WILDCARD: &str = "*";

/// Reserved key holding a leaf's own value when the leaf also carries attached children.
pub const VALUE_KEY: &str = "__value__";

/// Reserved root leaf holding the row identifier.
pub const ROWID: &str = "__rowid__";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathSegment {
    Name(String),
    Index(usize),
    Wildcard,
}

impl PathSegment {
    #[inline]
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        matches!(self, PathSegment::Wildcard)
    }

    #[inline]
    #[must_use]
    pub fn as_name(&self) -> Option<&str> {
        match self {
            PathSegment::Name(name) => Some(name),
            _ => None,
        }
    }

    /// Index addressed by this segment when applied to a list. Digit-only names count.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            PathSegment::Index(i) => Some(*i),
            PathSegment::Name(name)
                if !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit()) =>
            {
                name.parse().ok()
            }
            _ => None,
        }
    }

    /// Equality that treats a digit-only name and the index it spells as the same segment.
    #[must_use]
    pub fn addresses(&self, other: &PathSegment) -> bool {
        self == other
            || matches!((self.as_index(), other.as_index()), (Some(a), Some(b)) if a == b)
    }
}

impl From<&str> for PathSegment {
    fn from(s: &str) -> Self {
        if s == PATH_WILDCARD {
            PathSegment::Wildcard
        } else {
            PathSegment::Name(s.to_string())
        }
    }
}

impl From<String> for PathSegment {
    fn from(s: String) -> Self {
        if s == PATH_WILDCARD {
            PathSegment::Wildcard
        } else {
            PathSegment::Name(s)
        }
    }
}

impl From<usize> for PathSegment {
    fn from(i: usize) -> Self {
        PathSegment::Index(i)
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Name(name) if name.contains('.') || name.contains('"') => {
                write!(f, "\"{}\"", name)
            }
            PathSegment::Name(name) => f.write_str(name),
            PathSegment::Index(i) => write!(f, "{}", i),
            PathSegment::Wildcard => f.write_str(PATH_WILDCARD),
        }
    }
}

/// An ordered sequence of segments addressing a schema node or an item value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Path(SmallVec<[PathSegment; 4]>);

impl Path {
    pub fn new() -> Self {
        Self(SmallVec::new())
    }

    pub fn from_segments<I: IntoIterator<Item = PathSegment>>(segments: I) -> Self {
        Self(segments.into_iter().collect())
    }

    /// Parses a dotted path. Double quotes protect dots inside a name: `a."b.c".d`.
    pub fn parse(dotted: &str) -> Result<Self> {
        let mut segments = SmallVec::new();
        if dotted.is_empty() {
            return Ok(Self(segments));
        }

        let mut current = String::new();
        let mut quoted = false;
        let mut was_quoted = false;
        for c in dotted.chars() {
            match c {
                '"' => {
                    quoted = !quoted;
                    was_quoted = true;
                }
                '.' if !quoted => {
                    segments.push(Self::finish_segment(dotted, &mut current, was_quoted)?);
                    was_quoted = false;
                }
                _ => current.push(c),
            }
        }
        if quoted {
            return Err(Error::PathResolution(format!("unbalanced quote in path \"{}\"", dotted)));
        }
        segments.push(Self::finish_segment(dotted, &mut current, was_quoted)?);
        Ok(Self(segments))
    }

    fn finish_segment(dotted: &str, current: &mut String, was_quoted: bool) -> Result<PathSegment> {
        if current.is_empty() && !was_quoted {
            return Err(Error::PathResolution(format!("empty segment in path \"{}\"", dotted)));
        }
        let name = std::mem::take(current);
        if was_quoted {
            Ok(PathSegment::Name(name))
        } else {
            Ok(PathSegment::from(name))
        }
    }

    #[inline]
    #[must_use]
    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn last(&self) -> Option<&PathSegment> {
        self.0.last()
    }

    pub fn push<S: Into<PathSegment>>(&mut self, segment: S) {
        self.0.push(segment.into());
    }

    /// Returns a new path with `segment` appended.
    #[must_use]
    pub fn child<S: Into<PathSegment>>(&self, segment: S) -> Path {
        let mut path = self.clone();
        path.push(segment);
        path
    }

    #[must_use]
    pub fn join(&self, other: &Path) -> Path {
        let mut path = self.clone();
        path.0.extend(other.0.iter().cloned());
        path
    }

    #[must_use]
    pub fn parent(&self) -> Option<Path> {
        if self.0.is_empty() {
            None
        } else {
            Some(Path(self.0[..self.0.len() - 1].iter().cloned().collect()))
        }
    }

    #[must_use]
    pub fn prefix(&self, len: usize) -> Path {
        Path(self.0[..len.min(self.0.len())].iter().cloned().collect())
    }

    #[must_use]
    pub fn starts_with(&self, prefix: &Path) -> bool {
        self.0.starts_with(&prefix.0)
    }

    #[must_use]
    pub fn has_wildcard(&self) -> bool {
        self.0.iter().any(PathSegment::is_wildcard)
    }

    /// Drops a trailing value key, which addresses the same leaf as its parent.
    #[must_use]
    pub fn strip_value_key(&self) -> Path {
        match self.0.last() {
            Some(PathSegment::Name(name)) if name == VALUE_KEY => {
                Path(self.0[..self.0.len() - 1].iter().cloned().collect())
            }
            _ => self.clone(),
        }
    }

    /// Segment-wise match of `self` as a pattern against a concrete path.
    /// Lengths must be equal; a wildcard in the pattern matches any segment.
    pub fn matches(&self, concrete: &Path) -> bool {
        self.0.len() == concrete.0.len()
            && self
                .0
                .iter()
                .zip(concrete.0.iter())
                .all(|(pattern, segment)| pattern.is_wildcard() || pattern.addresses(segment))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PathSegment> {
        self.0.iter()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{}", segment)?;
        }
        Ok(())
    }
}

impl<const N: usize> From<[&str; N]> for Path {
    fn from(names: [&str; N]) -> Self {
        Self(names.iter().map(|s| PathSegment::from(*s)).collect())
    }
}

impl From<&[&str]> for Path {
    fn from(names: &[&str]) -> Self {
        Self(names.iter().map(|s| PathSegment::from(*s)).collect())
    }
}

impl From<Vec<PathSegment>> for Path {
    fn from(segments: Vec<PathSegment>) -> Self {
        Self(segments.into_iter().collect())
    }
}

impl FromIterator<PathSegment> for Path {
    fn from_iter<I: IntoIterator<Item = PathSegment>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Path {
    type Item = &'a PathSegment;
    type IntoIter = std::slice::Iter<'a, PathSegment>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl Serialize for PathSegment {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            PathSegment::Name(name) => serializer.serialize_str(name),
            PathSegment::Index(i) => serializer.serialize_u64(*i as u64),
            PathSegment::Wildcard => serializer.serialize_str(PATH_WILDCARD),
        }
    }
}

struct SegmentVisitor;

impl<'de> Visitor<'de> for SegmentVisitor {
    type Value = PathSegment;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a field name, an index or \"*\"")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<PathSegment, E> {
        Ok(PathSegment::from(v))
    }

    fn visit_string<E: de::Error>(self, v: String) -> std::result::Result<PathSegment, E> {
        Ok(PathSegment::from(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<PathSegment, E> {
        Ok(PathSegment::Index(v as usize))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<PathSegment, E> {
        usize::try_from(v)
            .map(PathSegment::Index)
            .map_err(|_| E::custom(format!("negative path index {}", v)))
    }
}

impl<'de> Deserialize<'de> for PathSegment {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(SegmentVisitor)
    }
}

impl Serialize for Path {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.iter())
    }
}

struct PathVisitor;

impl<'de> Visitor<'de> for PathVisitor {
    type Value = Path;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a list of path segments or a dotted path string")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Path, E> {
        Path::parse(v).map_err(E::custom)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<Path, A::Error> {
        let mut segments = SmallVec::new();
        while let Some(segment) = seq.next_element::<PathSegment>()? {
            segments.push(segment);
        }
        Ok(Path(segments))
    }
}

impl<'de> Deserialize<'de> for Path {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(PathVisitor)
    }
}
