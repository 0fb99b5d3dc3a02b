// Walking, wrapping and merging nested items along schema paths
use rayon::prelude::*;
use smallvec::SmallVec;

use crate::error::{Error, Result};
use crate::item::Item;
use crate::ordered_map::OrderedMap;
use crate::path::{Path, PathSegment, VALUE_KEY};

/// List positions taken by wildcards while walking a path.
pub type Indices = SmallVec<[usize; 4]>;

/// Every value addressed by `path`, expanding wildcards. A missing or null value yields `None`;
/// a wildcard over a missing list yields nothing.
pub fn values_at<'a>(item: &'a Item, path: &Path) -> Vec<Option<&'a Item>> {
    let mut out = Vec::new();
    walk(Some(item), path.segments(), &mut out);
    out
}

fn walk<'a>(item: Option<&'a Item>, path: &[PathSegment], out: &mut Vec<Option<&'a Item>>) {
    match path.split_first() {
        None => out.push(item.map(Item::leaf_value).filter(|v| !v.is_null())),
        Some((PathSegment::Wildcard, rest)) => {
            if let Some(Item::List(items)) = item.map(Item::leaf_value) {
                for element in items {
                    walk(Some(element), rest, out);
                }
            }
        }
        Some((segment, rest)) => walk(item.and_then(|i| step(i, segment)), rest, out),
    }
}

fn step<'a>(item: &'a Item, segment: &PathSegment) -> Option<&'a Item> {
    match (segment, item) {
        (PathSegment::Name(name), Item::Struct(map)) => map.get(name),
        (segment, Item::List(items)) => segment.as_index().and_then(|i| items.get(i)),
        _ => None,
    }
}

/// Present (non-null) values addressed by `path` with the list positions that reached them.
/// The order matches [`wrap_outputs`].
pub fn indexed_values_at<'a>(item: &'a Item, path: &Path) -> Vec<(Indices, &'a Item)> {
    let mut out = Vec::new();
    walk_indexed(Some(item), path.segments(), &mut Indices::new(), &mut out);
    out
}

fn walk_indexed<'a>(
    item: Option<&'a Item>,
    path: &[PathSegment],
    indices: &mut Indices,
    out: &mut Vec<(Indices, &'a Item)>,
) {
    match path.split_first() {
        None => {
            if let Some(value) = item.map(Item::leaf_value).filter(|v| !v.is_null()) {
                out.push((indices.clone(), value));
            }
        }
        Some((PathSegment::Wildcard, rest)) => {
            if let Some(Item::List(items)) = item.map(Item::leaf_value) {
                for (i, element) in items.iter().enumerate() {
                    indices.push(i);
                    walk_indexed(Some(element), rest, indices, out);
                    indices.pop();
                }
            }
        }
        Some((segment, rest)) => {
            walk_indexed(item.and_then(|i| step(i, segment)), rest, indices, out)
        }
    }
}

/// Replaces each wildcard of `path` with the next of `indices`.
pub fn concretize(path: &Path, indices: &[usize]) -> Path {
    let mut remaining = indices.iter();
    path.iter()
        .map(|segment| match segment {
            PathSegment::Wildcard => remaining
                .next()
                .map_or(PathSegment::Wildcard, |i| PathSegment::Index(*i)),
            other => other.clone(),
        })
        .collect()
}

/// One signal input per present value at `path`, in [`indexed_values_at`] order. A span is
/// replaced by the text it covers in `text_path`, paired with the span start so outputs can be
/// shifted back; unresolvable spans become nulls.
pub fn signal_inputs(item: &Item, path: &Path, text_path: Option<&Path>) -> Vec<(Item, u32)> {
    indexed_values_at(item, path)
        .into_iter()
        .map(|(indices, value)| match (value, text_path) {
            (Item::Span { start, end }, Some(text_path)) => {
                let text = item
                    .get_path(&concretize(text_path, &indices))
                    .ok()
                    .map(Item::leaf_value)
                    .and_then(Item::as_str)
                    .and_then(|text| text.get(*start as usize..*end as usize));
                match text {
                    Some(text) => (Item::from(text), *start),
                    None => (Item::Null, 0),
                }
            }
            (value, _) => (value.clone(), 0),
        })
        .collect()
}

/// Signal inputs of many rows, flattened in row order so a signal sees one batch.
#[derive(Debug, Clone, Default)]
pub struct BatchInputs {
    values: Vec<Item>,
    offsets: Vec<u32>,
    row_lens: Vec<usize>,
}

impl BatchInputs {
    pub fn collect(items: &[Item], path: &Path, text_path: Option<&Path>) -> Self {
        let per_row: Vec<Vec<(Item, u32)>> = items
            .par_iter()
            .map(|item| signal_inputs(item, path, text_path))
            .collect();
        let mut batch = BatchInputs {
            row_lens: per_row.iter().map(Vec::len).collect(),
            ..Default::default()
        };
        for (value, offset) in per_row.into_iter().flatten() {
            batch.values.push(value);
            batch.offsets.push(offset);
        }
        batch
    }

    #[inline]
    pub fn values(&self) -> &[Item] {
        &self.values
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Shifts span outputs back into the coordinates of their text and wraps each row's share
    /// under `path` + `key`. `items` must be the rows the batch was collected from.
    pub fn wrap(
        &self,
        items: &[Item],
        path: &Path,
        key: &str,
        outputs: Vec<Option<Item>>,
    ) -> Result<Vec<Option<Item>>> {
        if outputs.len() != self.values.len() {
            return Err(Error::InvalidSignalOutput(format!(
                "\"{}\" returned {} outputs for {} inputs",
                key,
                outputs.len(),
                self.values.len()
            )));
        }
        let outputs = outputs
            .into_iter()
            .zip(&self.offsets)
            .map(|(output, offset)| {
                output
                    .map(|mut output| output.offset_spans(*offset).map(|()| output))
                    .transpose()
            })
            .collect::<Result<Vec<_>>>()?;
        let mut outputs = outputs.into_iter();
        Ok(items
            .iter()
            .zip(&self.row_lens)
            .map(|(item, len)| {
                let mut row = outputs.by_ref().take(*len);
                let wrapped = wrap_outputs(item, path, key, &mut row);
                row.for_each(drop);
                wrapped
            })
            .collect())
    }
}

/// Rebuilds the shape of `path` inside `item` and places the next output under `key` for every
/// present value, in the order of [`indexed_values_at`]. Elements without an output become nulls
/// so list positions stay aligned; `None` when nothing in the row was annotated.
pub fn wrap_outputs<I>(item: &Item, path: &Path, key: &str, outputs: &mut I) -> Option<Item>
where
    I: Iterator<Item = Option<Item>>,
{
    wrap(Some(item), path.segments(), key, outputs)
}

fn wrap<I>(item: Option<&Item>, path: &[PathSegment], key: &str, outputs: &mut I) -> Option<Item>
where
    I: Iterator<Item = Option<Item>>,
{
    match path.split_first() {
        None => {
            item.map(Item::leaf_value).filter(|v| !v.is_null())?;
            let output = outputs.next().flatten()?;
            Some(Item::from_pairs([(key, output)]))
        }
        Some((PathSegment::Wildcard, rest)) => {
            let Some(Item::List(items)) = item.map(Item::leaf_value) else {
                return None;
            };
            let wrapped: Vec<Item> = items
                .iter()
                .map(|element| wrap(Some(element), rest, key, outputs).unwrap_or(Item::Null))
                .collect();
            if wrapped.iter().all(Item::is_null) {
                None
            } else {
                Some(Item::List(wrapped))
            }
        }
        Some((PathSegment::Name(name), rest)) => {
            let inner = wrap(item.and_then(|i| i.get(name)), rest, key, outputs)?;
            Some(Item::from_pairs([(name.as_str(), inner)]))
        }
        Some((PathSegment::Index(_), _)) => None,
    }
}

/// Wraps `value` under `path`. Names become structs; a wildcard expects `value` to already be a
/// list.
pub fn wrap_in_dicts(path: &Path, value: Item) -> Item {
    wrap_value(path.segments(), value)
}

fn wrap_value(path: &[PathSegment], value: Item) -> Item {
    match path.split_first() {
        None => value,
        Some((PathSegment::Name(name), rest)) => {
            Item::from_pairs([(name.as_str(), wrap_value(rest, value))])
        }
        Some((_, rest)) => match value {
            Item::List(items) => {
                Item::List(items.into_iter().map(|v| wrap_value(rest, v)).collect())
            }
            other => wrap_value(rest, other),
        },
    }
}

/// Merges `src` into `dest`. A null source leaves `dest` unchanged. A struct merged into a
/// primitive keeps the primitive under the value key; lists merge element-wise.
pub fn merge_items(dest: Item, src: Item) -> Item {
    match (dest, src) {
        (dest, Item::Null) => dest,
        (Item::Null, src) => src,
        (Item::Struct(mut dest), Item::Struct(src)) => {
            for (key, value) in src {
                let merged = match dest.get_mut(&key) {
                    Some(existing) => merge_items(std::mem::replace(existing, Item::Null), value),
                    None => value,
                };
                dest.insert(key, merged);
            }
            Item::Struct(dest)
        }
        (Item::List(dest), Item::List(src)) => {
            let len = dest.len().max(src.len());
            let mut dest = dest.into_iter();
            let mut src = src.into_iter();
            Item::List(
                (0..len)
                    .map(|_| {
                        merge_items(
                            dest.next().unwrap_or(Item::Null),
                            src.next().unwrap_or(Item::Null),
                        )
                    })
                    .collect(),
            )
        }
        (Item::Struct(mut dest), primitive) => {
            let value = dest.remove(VALUE_KEY).unwrap_or(Item::Null);
            let mut merged = OrderedMap::with_capacity(dest.len() + 1);
            merged.insert(VALUE_KEY, merge_items(value, primitive));
            for (key, child) in dest {
                merged.insert(key, child);
            }
            Item::Struct(merged)
        }
        (primitive, Item::Struct(src)) => {
            if src.is_empty() {
                primitive
            } else {
                merge_items(Item::from_pairs([(VALUE_KEY, primitive)]), Item::Struct(src))
            }
        }
        (_, src) => src,
    }
}

/// The sub-tree of `item` along `path`, keeping the enclosing structs and lists.
pub fn project(item: &Item, path: &Path) -> Option<Item> {
    project_segments(item, path.segments())
}

fn project_segments(item: &Item, path: &[PathSegment]) -> Option<Item> {
    match path.split_first() {
        None => Some(item.clone()),
        Some((PathSegment::Name(name), rest)) => {
            let inner = project_segments(item.get(name)?, rest)?;
            Some(Item::from_pairs([(name.as_str(), inner)]))
        }
        Some((PathSegment::Wildcard, rest)) => match item.leaf_value() {
            Item::List(items) => Some(Item::List(
                items
                    .iter()
                    .map(|element| project_segments(element, rest).unwrap_or(Item::Null))
                    .collect(),
            )),
            _ => None,
        },
        Some((PathSegment::Index(_), _)) => None,
    }
}

/// The value at `path` without enclosing structs; wildcards produce nested lists.
pub fn select_value(item: &Item, path: &Path) -> Item {
    select_segments(Some(item), path.segments())
}

fn select_segments(item: Option<&Item>, path: &[PathSegment]) -> Item {
    match path.split_first() {
        None => item.cloned().unwrap_or(Item::Null),
        Some((PathSegment::Wildcard, rest)) => match item.map(Item::leaf_value) {
            Some(Item::List(items)) => {
                Item::List(items.iter().map(|e| select_segments(Some(e), rest)).collect())
            }
            _ => Item::Null,
        },
        Some((segment, rest)) => select_segments(item.and_then(|i| step(i, segment)), rest),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row() -> Item {
        Item::from_json(&json!({
            "title": "a",
            "docs": [{"text": "one"}, {"text": null}, {"text": "three"}]
        }))
    }

    #[test]
    fn test_values_at_wildcard() {
        let item = row();
        let values = values_at(&item, &Path::from(["docs", "*", "text"]));
        assert_eq!(values.len(), 3);
        assert_eq!(values[0], Some(&Item::from("one")));
        assert_eq!(values[1], None);
        assert!(values_at(&item, &Path::from(["missing", "*"])).is_empty());
        assert_eq!(values_at(&item, &Path::from(["missing"])), vec![None]);
    }

    #[test]
    fn test_indexed_values_skip_nulls() {
        let item = row();
        let values = indexed_values_at(&item, &Path::from(["docs", "*", "text"]));
        let indices: Vec<usize> = values.iter().map(|(idx, _)| idx[0]).collect();
        assert_eq!(indices, vec![0, 2]);
        assert_eq!(
            concretize(&Path::from(["docs", "*", "text"]), &values[1].0),
            Path::from_segments([
                PathSegment::from("docs"),
                PathSegment::Index(2),
                PathSegment::from("text"),
            ])
        );
    }

    #[test]
    fn test_wrap_outputs_aligns_lists() {
        let item = row();
        let mut outputs = vec![Some(Item::Int(3)), Some(Item::Int(5))].into_iter();
        let wrapped =
            wrap_outputs(&item, &Path::from(["docs", "*", "text"]), "len", &mut outputs).unwrap();
        assert_eq!(
            wrapped.to_json(),
            json!({"docs": [{"text": {"len": 3}}, null, {"text": {"len": 5}}]})
        );
    }

    #[test]
    fn test_wrap_outputs_missing_annotation() {
        let item = Item::from_json(&json!({"text": "hi"}));
        let mut outputs = vec![None].into_iter();
        assert!(wrap_outputs(&item, &Path::from(["text"]), "len", &mut outputs).is_none());
    }

    #[test]
    fn test_merge_primitive_with_struct() {
        let source = Item::from_json(&json!({"text": "hello"}));
        let signal = Item::from_json(&json!({"text": {"len": 5}}));
        let merged = merge_items(source, signal);
        assert_eq!(merged.to_json(), json!({"text": {"__value__": "hello", "len": 5}}));
        assert_eq!(merged.get("text").unwrap().leaf_value(), &Item::from("hello"));
    }

    #[test]
    fn test_merge_null_source_keeps_dest() {
        let dest = Item::from_json(&json!({"a": 1}));
        assert_eq!(merge_items(dest.clone(), Item::Null), dest);
    }

    #[test]
    fn test_merge_lists_zip() {
        let dest = Item::from_json(&json!({"docs": [{"text": "a"}, {"text": "b"}]}));
        let src = Item::from_json(&json!({"docs": [{"text": {"len": 1}}, null]}));
        let merged = merge_items(dest, src);
        assert_eq!(
            merged.to_json(),
            json!({"docs": [{"text": {"__value__": "a", "len": 1}}, {"text": "b"}]})
        );
    }

    #[test]
    fn test_merge_two_signals() {
        let merged = merge_items(
            merge_items(
                Item::from_json(&json!({"text": "hello"})),
                Item::from_json(&json!({"text": {"a": 1}})),
            ),
            Item::from_json(&json!({"text": {"b": 2}})),
        );
        assert_eq!(merged.to_json(), json!({"text": {"__value__": "hello", "a": 1, "b": 2}}));
    }

    #[test]
    fn test_project_and_select() {
        let item = row();
        let projected = project(&item, &Path::from(["docs", "*", "text"])).unwrap();
        assert_eq!(
            projected.to_json(),
            json!({"docs": [{"text": "one"}, {"text": null}, {"text": "three"}]})
        );
        let selected = select_value(&item, &Path::from(["docs", "*", "text"]));
        assert_eq!(selected.to_json(), json!(["one", null, "three"]));
    }

    #[test]
    fn test_signal_inputs_resolve_spans() {
        let item = Item::from_json(&json!({
            "text": {"__value__": "Hi there. Bye.", "sentences": [
                {"__value__": {"start": 0, "end": 9}},
                {"__value__": {"start": 10, "end": 14}}
            ]}
        }));
        let inputs = signal_inputs(
            &item,
            &Path::from(["text", "sentences", "*"]),
            Some(&Path::from(["text"])),
        );
        assert_eq!(inputs, vec![(Item::from("Hi there."), 0), (Item::from("Bye."), 10)]);

        let plain = signal_inputs(&item, &Path::from(["text"]), None);
        assert_eq!(plain, vec![(Item::from("Hi there. Bye."), 0)]);
    }

    #[test]
    fn test_batch_inputs_wrap_per_row() {
        let items = vec![
            Item::from_json(&json!({"docs": ["a", null, "b"]})),
            Item::from_json(&json!({"docs": []})),
            Item::from_json(&json!({"docs": ["c"]})),
        ];
        let path = Path::from(["docs", "*"]);
        let batch = BatchInputs::collect(&items, &path, None);
        assert_eq!(batch.values(), &[Item::from("a"), Item::from("b"), Item::from("c")]);

        let outputs = vec![Some(Item::Int(1)), None, Some(Item::Int(3))];
        let wrapped = batch.wrap(&items, &path, "n", outputs).unwrap();
        assert_eq!(
            wrapped[0],
            Some(Item::from_json(&json!({"docs": [{"n": 1}, null, null]})))
        );
        assert_eq!(wrapped[1], None);
        assert_eq!(wrapped[2], Some(Item::from_json(&json!({"docs": [{"n": 3}]}))));

        assert!(matches!(
            batch.wrap(&items, &path, "n", vec![None]),
            Err(Error::InvalidSignalOutput(_))
        ));
    }

    #[test]
    fn test_wrap_in_dicts() {
        let wrapped = wrap_in_dicts(
            &Path::from(["a", "*", "b"]),
            Item::List(vec![Item::Int(1), Item::Int(2)]),
        );
        assert_eq!(wrapped.to_json(), json!({"a": [{"b": 1}, {"b": 2}]}));
    }
}
