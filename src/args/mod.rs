//! Arguments of builder methods.
//!
//! Every builder method records its arguments as [`Arg`]s. They stay ORM
//! level values (nested builders, references, models, ...) until the query
//! is built, when [`ArgConverter`] turns them into SQL builder arguments.

mod build;
mod raw;
mod reference;
mod value;

use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use crate::model::ModelRef;
use crate::query::QueryBuilder;

pub(crate) use build::{ArgConverter, build_arg, should_be_added};
pub use raw::{RawBuilder, fn_, raw};
pub use reference::{ReferenceBuilder, ref_};
pub use value::{ValueBuilder, val};

/// Builds a condition group on a fresh partial builder.
pub type GroupFn = Rc<dyn Fn(&mut QueryBuilder)>;

#[derive(Clone)]
pub enum Arg {
    /// A missing value. Fails the operation unless undefined values are
    /// skipped.
    Undefined,
    Value(Value),
    Raw(RawBuilder),
    Ref(ReferenceBuilder),
    Val(ValueBuilder),
    Query(Box<QueryBuilder>),
    Model(ModelRef),
    Array(Vec<Arg>),
    Object(Vec<(String, Arg)>),
    Group(GroupFn),
}

impl Arg {
    /// Wraps a closure that fills in a condition group.
    pub fn group(f: impl Fn(&mut QueryBuilder) + 'static) -> Self {
        Arg::Group(Rc::new(f))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Arg::Undefined)
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Arg::Array(_))
    }

    pub fn is_query(&self) -> bool {
        matches!(self, Arg::Query(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Arg::Value(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Arg]> {
        match self {
            Arg::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Arg::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Arg::Value(Value::Null))
    }

    /// Plain JSON when the argument holds nothing but plain values.
    pub fn to_json(&self) -> Option<Value> {
        match self {
            Arg::Value(v) => Some(v.clone()),
            Arg::Model(m) => Some(Value::Object(m.to_database_json())),
            Arg::Array(items) => items
                .iter()
                .map(Arg::to_json)
                .collect::<Option<Vec<_>>>()
                .map(Value::Array),
            Arg::Object(entries) => entries
                .iter()
                .map(|(k, v)| v.to_json().map(|v| (k.clone(), v)))
                .collect::<Option<serde_json::Map<_, _>>>()
                .map(Value::Object),
            _ => None,
        }
    }

    /// Flattens nested arrays into one list.
    pub fn flatten(args: Vec<Arg>) -> Vec<Arg> {
        let mut out = Vec::with_capacity(args.len());
        for arg in args {
            match arg {
                Arg::Array(items) => out.extend(Arg::flatten(items)),
                other => out.push(other),
            }
        }
        out
    }
}

impl fmt::Debug for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Undefined => f.write_str("Undefined"),
            Arg::Value(v) => write!(f, "{v}"),
            Arg::Raw(r) => r.fmt(f),
            Arg::Ref(r) => r.fmt(f),
            Arg::Val(v) => v.fmt(f),
            Arg::Query(q) => f.debug_tuple("Query").field(&q.model_class().table_name()).finish(),
            Arg::Model(m) => m.fmt(f),
            Arg::Array(items) => f.debug_list().entries(items).finish(),
            Arg::Object(entries) => f
                .debug_map()
                .entries(entries.iter().map(|(k, v)| (k, v)))
                .finish(),
            Arg::Group(_) => f.write_str("Group(..)"),
        }
    }
}

// =============================================================================
// Conversions
// =============================================================================

impl From<Value> for Arg {
    fn from(value: Value) -> Self {
        match value {
            Value::Array(items) => Arg::Array(items.into_iter().map(Arg::from).collect()),
            other => Arg::Value(other),
        }
    }
}

macro_rules! arg_from_primitive {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Arg {
                fn from(value: $ty) -> Self {
                    Arg::Value(Value::from(value))
                }
            }
        )*
    };
}

arg_from_primitive!(bool, i8, i16, i32, i64, u8, u16, u32, u64, f32, f64, String, &str);

impl From<&String> for Arg {
    fn from(value: &String) -> Self {
        Arg::Value(Value::String(value.clone()))
    }
}

impl From<()> for Arg {
    fn from(_: ()) -> Self {
        Arg::Value(Value::Null)
    }
}

impl<T: Into<Arg>> From<Option<T>> for Arg {
    fn from(value: Option<T>) -> Self {
        value.map_or(Arg::Undefined, Into::into)
    }
}

impl<T: Into<Arg>> From<Vec<T>> for Arg {
    fn from(items: Vec<T>) -> Self {
        Arg::Array(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Arg>, const N: usize> From<[T; N]> for Arg {
    fn from(items: [T; N]) -> Self {
        Arg::Array(items.into_iter().map(Into::into).collect())
    }
}

impl From<RawBuilder> for Arg {
    fn from(value: RawBuilder) -> Self {
        Arg::Raw(value)
    }
}

impl From<ReferenceBuilder> for Arg {
    fn from(value: ReferenceBuilder) -> Self {
        Arg::Ref(value)
    }
}

impl From<ValueBuilder> for Arg {
    fn from(value: ValueBuilder) -> Self {
        Arg::Val(value)
    }
}

impl From<QueryBuilder> for Arg {
    fn from(value: QueryBuilder) -> Self {
        Arg::Query(Box::new(value))
    }
}

impl From<&QueryBuilder> for Arg {
    fn from(value: &QueryBuilder) -> Self {
        Arg::Query(Box::new(value.clone()))
    }
}

impl From<&mut QueryBuilder> for Arg {
    fn from(value: &mut QueryBuilder) -> Self {
        Arg::Query(Box::new(value.clone()))
    }
}

impl From<ModelRef> for Arg {
    fn from(value: ModelRef) -> Self {
        Arg::Model(value)
    }
}

impl From<&ModelRef> for Arg {
    fn from(value: &ModelRef) -> Self {
        Arg::Model(value.clone())
    }
}

// =============================================================================
// Argument lists
// =============================================================================

/// An explicit argument list.
#[derive(Debug, Clone, Default)]
pub struct Args(pub Vec<Arg>);

/// Anything a builder method accepts as its argument list: a single
/// argument or a tuple of up to six.
pub trait IntoArgs {
    fn into_args(self) -> Vec<Arg>;
}

impl IntoArgs for Args {
    fn into_args(self) -> Vec<Arg> {
        self.0
    }
}

impl IntoArgs for () {
    fn into_args(self) -> Vec<Arg> {
        Vec::new()
    }
}

macro_rules! into_args_single {
    ($($ty:ty),* $(,)?) => {
        $(
            impl IntoArgs for $ty {
                fn into_args(self) -> Vec<Arg> {
                    vec![Arg::from(self)]
                }
            }
        )*
    };
}

into_args_single!(
    Arg, Value, bool, i32, i64, u32, u64, f64, String, &str, &String, RawBuilder,
    ReferenceBuilder, ValueBuilder, QueryBuilder, &QueryBuilder, &mut QueryBuilder, ModelRef,
    &ModelRef,
);

impl<T: Into<Arg>> IntoArgs for Vec<T> {
    fn into_args(self) -> Vec<Arg> {
        vec![Arg::from(self)]
    }
}

impl<T: Into<Arg>, const N: usize> IntoArgs for [T; N] {
    fn into_args(self) -> Vec<Arg> {
        vec![Arg::from(self)]
    }
}

impl<T: Into<Arg>> IntoArgs for Option<T> {
    fn into_args(self) -> Vec<Arg> {
        vec![Arg::from(self)]
    }
}

macro_rules! into_args_tuple {
    ($($name:ident),+) => {
        impl<$($name: Into<Arg>),+> IntoArgs for ($($name,)+) {
            #[allow(non_snake_case)]
            fn into_args(self) -> Vec<Arg> {
                let ($($name,)+) = self;
                vec![$($name.into()),+]
            }
        }
    };
}

into_args_tuple!(A);
into_args_tuple!(A, B);
into_args_tuple!(A, B, C);
into_args_tuple!(A, B, C, D);
into_args_tuple!(A, B, C, D, E);
into_args_tuple!(A, B, C, D, E, F);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_arrays_become_arg_arrays() {
        let arg = Arg::from(json!([1, [2, 3]]));
        assert_eq!(arg.to_json(), Some(json!([1, [2, 3]])));
        assert!(arg.is_array());
    }

    #[test]
    fn none_is_undefined() {
        assert!(Arg::from(None::<i32>).is_undefined());
        assert_eq!(Arg::from(Some(3)).to_json(), Some(json!(3)));
    }

    #[test]
    fn tuples_spread_into_lists() {
        let args = ("age", ">", 10).into_args();
        assert_eq!(args.len(), 3);
        assert_eq!(args[1].as_str(), Some(">"));

        assert_eq!(vec!["a", "b"].into_args().len(), 1);
    }

    #[test]
    fn flatten_nested_arrays() {
        let flat = Arg::flatten(vec![Arg::from(json!(["a", ["b"]])), Arg::from("c")]);
        let names: Vec<_> = flat.iter().filter_map(Arg::as_str).collect();
        assert_eq!(names, ["a", "b", "c"]);
    }
}
