use bson::{Bson, Document};

use crate::domain::error::Error;

/// One step of a variable path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// Parse a `$.pipeline[0].$match.field` style path.
///
/// The grammar is deliberately small: a literal `$` root, dot-separated keys
/// (which may themselves start with `$`, as aggregation operators do) and
/// `[n]` array indices.
///
/// # Errors
/// `VariableInjection` on any malformed path.
pub fn parse(path: &str) -> Result<Vec<Segment>, Error> {
    let malformed = || Error::VariableInjection(format!("malformed variable path '{path}'"));

    let rest = path.strip_prefix('$').ok_or_else(malformed)?;
    let mut segments = Vec::new();
    let mut chars = rest.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '.' => {
                let mut key = String::new();
                while let Some(&c) = chars.peek() {
                    if c == '.' || c == '[' {
                        break;
                    }
                    key.push(c);
                    chars.next();
                }
                if key.is_empty() {
                    return Err(malformed());
                }
                segments.push(Segment::Key(key));
            }
            '[' => {
                let mut digits = String::new();
                for c in chars.by_ref() {
                    if c == ']' {
                        break;
                    }
                    digits.push(c);
                }
                let index: usize = digits.parse().map_err(|_| malformed())?;
                segments.push(Segment::Index(index));
            }
            _ => return Err(malformed()),
        }
    }

    if segments.is_empty() {
        return Err(malformed());
    }
    Ok(segments)
}

/// Resolve a parsed path against a pipeline, returning the addressed leaf.
///
/// The document root is `{ "pipeline": [...] }`, so the first segment must
/// be the `pipeline` key.
#[must_use]
pub fn resolve<'a>(pipeline: &'a [Document], segments: &[Segment]) -> Option<&'a Bson> {
    let mut iter = segments.iter();
    if iter.next() != Some(&Segment::Key("pipeline".into())) {
        return None;
    }
    let Some(Segment::Index(stage_index)) = iter.next() else {
        return None;
    };
    let stage = pipeline.get(*stage_index)?;

    let mut current: Option<&Bson> = None;
    for segment in iter {
        let next = match (current, segment) {
            (None, Segment::Key(key)) => stage.get(key),
            (Some(Bson::Document(doc)), Segment::Key(key)) => doc.get(key),
            (Some(Bson::Array(items)), Segment::Index(index)) => items.get(*index),
            _ => None,
        };
        current = Some(next?);
    }
    current
}

/// Resolve a parsed path mutably, for injection.
pub fn resolve_mut<'a>(
    pipeline: &'a mut [Document],
    segments: &[Segment],
) -> Option<&'a mut Bson> {
    let mut iter = segments.iter();
    if iter.next() != Some(&Segment::Key("pipeline".into())) {
        return None;
    }
    let Some(Segment::Index(stage_index)) = iter.next() else {
        return None;
    };
    let stage = pipeline.get_mut(*stage_index)?;

    let Some(first_segment) = iter.next() else {
        return None;
    };
    let Segment::Key(key) = first_segment else {
        return None;
    };
    let mut current: &mut Bson = stage.get_mut(key)?;

    for segment in iter {
        let next = match (current, segment) {
            (Bson::Document(doc), Segment::Key(key)) => doc.get_mut(key),
            (Bson::Array(items), Segment::Index(index)) => items.get_mut(*index),
            _ => None,
        };
        current = next?;
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn parses_operator_keys_and_indices() {
        let segments = parse("$.pipeline[0].$match.wallet").unwrap();
        assert_eq!(
            segments,
            vec![
                Segment::Key("pipeline".into()),
                Segment::Index(0),
                Segment::Key("$match".into()),
                Segment::Key("wallet".into()),
            ]
        );
    }

    #[test]
    fn rejects_malformed_paths() {
        assert!(parse("pipeline[0]").is_err());
        assert!(parse("$.").is_err());
        assert!(parse("$.pipeline[x]").is_err());
        assert!(parse("$").is_err());
    }

    #[test]
    fn resolves_through_arrays_and_documents() {
        let pipeline = vec![doc! {
            "$match": { "$or": [ { "type": "" }, { "category": { "$in": ["", "B"] } } ] }
        }];
        let segments = parse("$.pipeline[0].$match.$or[1].category.$in[0]").unwrap();
        let leaf = resolve(&pipeline, &segments).unwrap();
        assert_eq!(leaf, &Bson::String(String::new()));
    }

    #[test]
    fn missing_positions_resolve_to_none() {
        let pipeline = vec![doc! { "$match": { "a": 1 } }];
        let segments = parse("$.pipeline[0].$match.b").unwrap();
        assert!(resolve(&pipeline, &segments).is_none());
        let segments = parse("$.pipeline[3].$match.a").unwrap();
        assert!(resolve(&pipeline, &segments).is_none());
    }
}
