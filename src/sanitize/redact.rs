//! Path-tracking traversal over captured data.

use crate::model::{
    CommandRecord, ComponentPerformance, ComponentSnapshot, EventRecord, RefSnapshot, StateChange,
};
use crate::value::{CapturedValue, ValueMap};

/// Types whose string leaves can be inspected or rewritten.
///
/// `path` is the location of `self`; implementations extend it with
/// [`join_field`] / [`join_index`] as they descend, producing paths such as
/// `components[0].props.password`.
pub trait Redact {
    fn redact_strings(&self, path: &str, visit: &mut dyn FnMut(&str, &str));
    fn redact_strings_mut(&mut self, path: &str, visit: &mut dyn FnMut(&str, &mut String));
}

pub fn join_field(base: &str, field: &str) -> String {
    if base.is_empty() {
        field.to_string()
    } else {
        format!("{base}.{field}")
    }
}

pub fn join_index(base: &str, index: usize) -> String {
    format!("{base}[{index}]")
}

impl Redact for String {
    fn redact_strings(&self, path: &str, visit: &mut dyn FnMut(&str, &str)) {
        visit(path, self);
    }

    fn redact_strings_mut(&mut self, path: &str, visit: &mut dyn FnMut(&str, &mut String)) {
        visit(path, self);
    }
}

impl Redact for CapturedValue {
    fn redact_strings(&self, path: &str, visit: &mut dyn FnMut(&str, &str)) {
        match self {
            CapturedValue::String(s) => visit(path, s),
            CapturedValue::Seq(items) => items.redact_strings(path, visit),
            CapturedValue::Map(map) => map.redact_strings(path, visit),
            CapturedValue::Record(record) => record.fields.redact_strings(path, visit),
            CapturedValue::Null
            | CapturedValue::Bool(_)
            | CapturedValue::Int(_)
            | CapturedValue::Float(_) => {}
        }
    }

    fn redact_strings_mut(&mut self, path: &str, visit: &mut dyn FnMut(&str, &mut String)) {
        match self {
            CapturedValue::String(s) => visit(path, s),
            CapturedValue::Seq(items) => items.redact_strings_mut(path, visit),
            CapturedValue::Map(map) => map.redact_strings_mut(path, visit),
            CapturedValue::Record(record) => record.fields.redact_strings_mut(path, visit),
            CapturedValue::Null
            | CapturedValue::Bool(_)
            | CapturedValue::Int(_)
            | CapturedValue::Float(_) => {}
        }
    }
}

impl Redact for ValueMap {
    fn redact_strings(&self, path: &str, visit: &mut dyn FnMut(&str, &str)) {
        for (key, value) in self {
            value.redact_strings(&join_field(path, key), visit);
        }
    }

    fn redact_strings_mut(&mut self, path: &str, visit: &mut dyn FnMut(&str, &mut String)) {
        for (key, value) in self.iter_mut() {
            value.redact_strings_mut(&join_field(path, key), visit);
        }
    }
}

impl<T: Redact> Redact for Vec<T> {
    fn redact_strings(&self, path: &str, visit: &mut dyn FnMut(&str, &str)) {
        for (i, item) in self.iter().enumerate() {
            item.redact_strings(&join_index(path, i), visit);
        }
    }

    fn redact_strings_mut(&mut self, path: &str, visit: &mut dyn FnMut(&str, &mut String)) {
        for (i, item) in self.iter_mut().enumerate() {
            item.redact_strings_mut(&join_index(path, i), visit);
        }
    }
}

impl<T: Redact> Redact for Option<T> {
    fn redact_strings(&self, path: &str, visit: &mut dyn FnMut(&str, &str)) {
        if let Some(inner) = self {
            inner.redact_strings(path, visit);
        }
    }

    fn redact_strings_mut(&mut self, path: &str, visit: &mut dyn FnMut(&str, &mut String)) {
        if let Some(inner) = self {
            inner.redact_strings_mut(path, visit);
        }
    }
}

/// Implement [`Redact`] by visiting the named fields in order.
macro_rules! redact_fields {
    ($ty:ty; $($field:ident),* $(,)?) => {
        impl Redact for $ty {
            #[allow(unused_variables)]
            fn redact_strings(&self, path: &str, visit: &mut dyn FnMut(&str, &str)) {
                $(self.$field.redact_strings(&join_field(path, stringify!($field)), visit);)*
            }

            #[allow(unused_variables)]
            fn redact_strings_mut(
                &mut self,
                path: &str,
                visit: &mut dyn FnMut(&str, &mut String),
            ) {
                $(self.$field.redact_strings_mut(&join_field(path, stringify!($field)), visit);)*
            }
        }
    };
}

pub(crate) use redact_fields;

// Ids and component names stay intact; free-text labels are visited.
redact_fields!(RefSnapshot; name, value);
redact_fields!(ComponentSnapshot; props, state, refs);
redact_fields!(StateChange; ref_name, old_value, new_value, source);
redact_fields!(EventRecord; name, payload);
redact_fields!(CommandRecord; command_type, payload);
redact_fields!(ComponentPerformance;);
