//! Per-kind attribute schema.
//!
//! Each item type declares an ordered list of `(name, type, getter, setter)`
//! entries. The differencer, the cache merge step and both snapshot sources
//! walk this list instead of reflecting over live values, so every kind is
//! compared on the same, stable attribute set.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::Hash;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::ResourceKind;

/// Attribute value. Equality is type-consistent: `Int(1)` never equals `Str("1")`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Int(i64),
    Str(String),
}

impl AttrValue {
    pub fn ty(&self) -> AttrType {
        match self {
            AttrValue::Int(_) => AttrType::Int,
            AttrValue::Str(_) => AttrType::Str,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttrValue::Int(v) => Some(*v),
            AttrValue::Str(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) => Some(s),
            AttrValue::Int(_) => None,
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Int(v) => write!(f, "{}", v),
            AttrValue::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self { AttrValue::Int(v) }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self { AttrValue::Str(v.to_string()) }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self { AttrValue::Str(v) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttrType {
    Int,
    Str,
}

impl AttrType {
    pub fn default_value(self) -> AttrValue {
        match self {
            AttrType::Int => AttrValue::Int(0),
            AttrType::Str => AttrValue::Str(String::new()),
        }
    }
}

/// Rust field types that can back a schema attribute.
pub trait Attr: Sized {
    const TYPE: AttrType;
    fn to_attr(&self) -> AttrValue;
    fn from_attr(v: &AttrValue) -> Option<Self>;
}

impl Attr for i64 {
    const TYPE: AttrType = AttrType::Int;
    fn to_attr(&self) -> AttrValue { AttrValue::Int(*self) }
    fn from_attr(v: &AttrValue) -> Option<Self> { v.as_int() }
}

impl Attr for String {
    const TYPE: AttrType = AttrType::Str;
    fn to_attr(&self) -> AttrValue { AttrValue::Str(self.clone()) }
    fn from_attr(v: &AttrValue) -> Option<Self> { v.as_str().map(str::to_string) }
}

/// One schema entry. `set` returns false when the value has the wrong type.
pub struct Field<R> {
    pub name: &'static str,
    pub ty: AttrType,
    pub get: fn(&R) -> AttrValue,
    pub set: fn(&mut R, &AttrValue) -> bool,
}

impl<R> fmt::Debug for Field<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field").field("name", &self.name).field("ty", &self.ty).finish()
    }
}

/// Decoded attribute row keyed by attribute name (any case).
pub type AttrRow = BTreeMap<String, AttrValue>;

/// An item of one resource kind.
pub trait Record: Clone + Default + PartialEq + fmt::Debug + Send + Sync + 'static {
    type Key: Clone + Eq + Hash + Ord + fmt::Debug + Send + Sync + 'static;

    const KIND: ResourceKind;

    fn key(&self) -> Self::Key;

    /// Ordered, lower-case attribute list.
    fn schema() -> &'static [Field<Self>];

    fn field(name: &str) -> Option<&'static Field<Self>> {
        Self::schema().iter().find(|f| f.name.eq_ignore_ascii_case(name))
    }

    fn to_row(&self) -> AttrRow {
        Self::schema().iter().map(|f| (f.name.to_string(), (f.get)(self))).collect()
    }

    /// Build an item from a row. Names match case-insensitively; attributes
    /// missing from the row keep their type default.
    fn from_row(row: &AttrRow) -> Result<Self, CoreError> {
        let lowered: FxHashMap<String, &AttrValue> =
            row.iter().map(|(k, v)| (k.to_ascii_lowercase(), v)).collect();
        let mut out = Self::default();
        for f in Self::schema() {
            if let Some(v) = lowered.get(f.name) {
                if !(f.set)(&mut out, v) {
                    return Err(CoreError::AttrType { kind: Self::KIND, attr: f.name, expected: f.ty, got: v.ty() });
                }
            }
        }
        Ok(out)
    }

    /// Merge a field delta onto a copy of `self`.
    fn merged(&self, delta: &BTreeMap<String, AttrValue>) -> Result<Self, CoreError> {
        let mut out = self.clone();
        for (name, v) in delta {
            let f = Self::field(name).ok_or_else(|| CoreError::UnknownAttr { kind: Self::KIND, attr: name.clone() })?;
            if !(f.set)(&mut out, v) {
                return Err(CoreError::AttrType { kind: Self::KIND, attr: f.name, expected: f.ty, got: v.ty() });
            }
        }
        Ok(out)
    }
}

/// Declare a schema as `type; "name" => field: FieldType, ...`.
#[macro_export]
macro_rules! schema {
    ($ty:ty; $($name:literal => $field:ident : $fty:ty),* $(,)?) => {{
        static SCHEMA: &[$crate::schema::Field<$ty>] = &[
            $($crate::schema::Field {
                name: $name,
                ty: <$fty as $crate::schema::Attr>::TYPE,
                get: |r: &$ty| $crate::schema::Attr::to_attr(&r.$field),
                set: |r: &mut $ty, v: &$crate::schema::AttrValue| {
                    match <$fty as $crate::schema::Attr>::from_attr(v) {
                        Some(x) => { r.$field = x; true }
                        None => false,
                    }
                },
            }),*
        ];
        SCHEMA
    }};
}
