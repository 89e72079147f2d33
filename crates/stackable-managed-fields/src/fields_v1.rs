//! Decoding of the structured-merge-diff `FieldsV1` format.
//!
//! Kubernetes records which fields a manager owns as a nested JSON object. Every key is a
//! serialized path element, every value is the set of paths below that element:
//!
//! ```json
//! {
//!   "f:spec": {
//!     ".": {},
//!     "f:containers": {
//!       "k:{\"name\":\"nginx\"}": { "f:image": {} }
//!     }
//!   }
//! }
//! ```
//!
//! The supported prefixes are `f:` (field name), `k:` (list item selected by its key fields),
//! `v:` (set item selected by value) and `i:` (list item selected by index). The special key
//! `.` marks the enclosing element itself as owned. See the [server-side apply documentation]
//! for details.
//!
//! [server-side apply documentation]: https://kubernetes.io/docs/reference/using-api/server-side-apply/#field-management
use std::{fmt::Display, str::FromStr};

use k8s_openapi::apimachinery::pkg::apis::meta::v1::FieldsV1;
use serde_json::{Map, Value};
use snafu::{ResultExt, Snafu};

use crate::{document::ValueKind, field_path::FieldPath};

type Result<T, E = Error> = std::result::Result<T, E>;

const SELF_MARKER: &str = ".";

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("expected the field set at {location:?} to be an object, got {found}"))]
    UnexpectedNode { location: String, found: ValueKind },

    #[snafu(display("failed to parse path element {key:?}"))]
    ParsePathElement {
        source: PathElementError,
        key: String,
    },
}

#[derive(Debug, Snafu)]
pub enum PathElementError {
    #[snafu(display("unknown path element type"))]
    UnknownType,

    #[snafu(display("list key is not a JSON object"))]
    ParseKey { source: serde_json::Error },

    #[snafu(display("set value is not valid JSON"))]
    ParseValue { source: serde_json::Error },

    #[snafu(display("list index is not a non-negative integer"))]
    ParseIndex { source: std::num::ParseIntError },
}

/// A single step in a [`FieldSet`] member path.
#[derive(Clone, Debug, PartialEq)]
pub enum PathElement {
    /// A named field of an object (`f:`).
    Field(String),

    /// A list item selected by its key fields (`k:`).
    Key(Map<String, Value>),

    /// A set item selected by its value (`v:`).
    Value(Value),

    /// A list item selected by its index (`i:`).
    Index(usize),
}

impl PathElement {
    pub fn field_name(&self) -> Option<&str> {
        match self {
            Self::Field(name) => Some(name),
            Self::Key(_) | Self::Value(_) | Self::Index(_) => None,
        }
    }
}

impl FromStr for PathElement {
    type Err = PathElementError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let Some((prefix, payload)) = input.split_at_checked(2) else {
            return UnknownTypeSnafu.fail();
        };

        match prefix {
            "f:" => Ok(Self::Field(payload.to_owned())),
            "k:" => serde_json::from_str(payload)
                .map(Self::Key)
                .context(ParseKeySnafu),
            "v:" => serde_json::from_str(payload)
                .map(Self::Value)
                .context(ParseValueSnafu),
            "i:" => payload.parse().map(Self::Index).context(ParseIndexSnafu),
            _ => UnknownTypeSnafu.fail(),
        }
    }
}

impl Display for PathElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Field(name) => write!(f, ".{name}"),
            Self::Key(fields) => {
                let fields: Vec<String> = fields
                    .iter()
                    .map(|(name, value)| format!("{name}={value}"))
                    .collect();
                write!(f, "[{}]", fields.join(","))
            }
            Self::Value(value) => write!(f, "[={value}]"),
            Self::Index(index) => write!(f, "[{index}]"),
        }
    }
}

/// The decoded member paths of a `FieldsV1` payload.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FieldSet {
    members: Vec<Vec<PathElement>>,
}

impl FieldSet {
    /// Decodes a raw `FieldsV1` JSON value. A JSON `null` decodes into an empty set.
    pub fn from_json(raw: &Value) -> Result<Self> {
        let mut set = Self::default();

        match raw {
            Value::Null => {}
            Value::Object(root) => {
                set.collect_members(root, &mut Vec::new())?;
            }
            other => {
                return UnexpectedNodeSnafu {
                    location: "",
                    found: ValueKind::of(other),
                }
                .fail();
            }
        }

        Ok(set)
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Iterates over all member paths including list and set selectors.
    pub fn members(&self) -> impl Iterator<Item = &[PathElement]> {
        self.members.iter().map(Vec::as_slice)
    }

    /// Flattens every member into a [`FieldPath`] by dropping all non-field elements.
    ///
    /// Members consisting solely of selectors are skipped. Duplicates are kept, e.g. the
    /// `image` of two different containers both result in `spec.containers.image`.
    pub fn field_paths(&self) -> impl Iterator<Item = FieldPath> + '_ {
        self.members
            .iter()
            .filter_map(|member| FieldPath::new(member.iter().filter_map(PathElement::field_name)))
    }

    /// Walks `node` and records members below `prefix`. Returns whether any member was found.
    fn collect_members(
        &mut self,
        node: &Map<String, Value>,
        prefix: &mut Vec<PathElement>,
    ) -> Result<bool> {
        let mut found_member = false;

        for (key, child) in node {
            if key == SELF_MARKER {
                continue;
            }

            let element = match key.parse::<PathElement>() {
                Ok(element) => element,
                Err(PathElementError::UnknownType) => {
                    tracing::trace!(key = %key, "ignoring path element of unknown type");
                    continue;
                }
                Err(source) => {
                    return Err(Error::ParsePathElement {
                        source,
                        key: key.clone(),
                    });
                }
            };

            let empty = Map::new();
            let child = match child {
                Value::Object(child) => child,
                Value::Null => &empty,
                other => {
                    return UnexpectedNodeSnafu {
                        location: render_location(prefix, &element),
                        found: ValueKind::of(other),
                    }
                    .fail();
                }
            };

            prefix.push(element);
            let has_descendants = self.collect_members(child, prefix)?;

            // A node without any (known) descendants is owned by itself, others only when they
            // carry the self marker.
            if !has_descendants || child.contains_key(SELF_MARKER) {
                self.members.push(prefix.clone());
            }
            prefix.pop();

            found_member = true;
        }

        Ok(found_member)
    }
}

impl TryFrom<&FieldsV1> for FieldSet {
    type Error = Error;

    fn try_from(fields: &FieldsV1) -> Result<Self, Self::Error> {
        Self::from_json(&fields.0)
    }
}

fn render_location(prefix: &[PathElement], element: &PathElement) -> String {
    prefix.iter().chain([element]).map(ToString::to_string).collect()
}
