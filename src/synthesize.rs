//! Default expression text for a proposed source → target attribute link.
//!
//! The output is only text; it is evaluated later by the batch runner or an
//! authoring tool's preview. Missing schema information never fails here, it
//! just yields a plain object skeleton.

use crate::expression::quote_name;
use crate::schema::{child_schema, is_array_segment, resolve, AttributePath, SchemaNode};
use serde_json::Value;
use tracing::{debug, trace};

/// Build the default assignment expression for `source_path → target_path`.
///
/// When both paths start at array-kind root entities the result maps each
/// element of the source root array, with the value reference made relative
/// to the element. Otherwise the full target skeleton is emitted with the
/// source path as the leaf value. Returns an empty string when either path is
/// empty.
pub fn build_default_assignment_expression(
    source_schema: Option<&SchemaNode>,
    target_schema: Option<&SchemaNode>,
    source_path: &str,
    target_path: &str,
) -> String {
    let source = AttributePath::parse(source_path);
    let target = AttributePath::parse(target_path);
    let (Some(source_root), Some(target_root)) = (source.root(), target.root()) else {
        return String::new();
    };

    if source_schema.is_none() || target_schema.is_none() {
        debug!(%source, %target, "schema missing, emitting plain skeleton");
    }
    if source_schema.is_some_and(|s| resolve(s, &source).is_none()) {
        debug!(%source, "source path not found in source schema");
    }
    if target_schema.is_some_and(|s| resolve(s, &target).is_none()) {
        debug!(%target, "target path not found in target schema, array wrapping may be incomplete");
    }

    let source_root_is_array = source_schema.is_some_and(|s| is_array_segment(s, source_root));
    let target_root_is_array = target_schema.is_some_and(|s| is_array_segment(s, target_root));
    let flags = array_flags(target_schema, &target);
    trace!(%source, %target, source_root_is_array, target_root_is_array, ?flags, "synthesizing");

    if source_root_is_array && target_root_is_array {
        let element_value = if source.len() == 1 {
            "$".to_string()
        } else {
            render_path(&source.relative())
        };
        let per_element = if target.len() == 1 {
            format!("({element_value})")
        } else {
            render_skeleton(&target.segments()[1..], &flags[1..], &element_value)
        };
        let mapping = format!("{}.{per_element}", quote_name(source_root));
        return format!("{{ {}: [{mapping}] }}", json_key(target_root));
    }

    render_skeleton(target.segments(), &flags, &render_path(&source))
}

/// Per target segment: is it array-kind in its parent schema.
fn array_flags(schema: Option<&SchemaNode>, path: &AttributePath) -> Vec<bool> {
    let mut current = schema;
    path.segments()
        .iter()
        .map(|seg| {
            let flag = current.is_some_and(|s| is_array_segment(s, seg));
            current = current.and_then(|s| child_schema(s, seg)).map(|child| match child {
                SchemaNode::Array(item) => item.as_ref(),
                other => other,
            });
            flag
        })
        .collect()
}

/// `{ "a": { "b": value } }`, with array-flagged ancestors as `[{ ... }]`.
fn render_skeleton(segments: &[String], flags: &[bool], value: &str) -> String {
    format!("{{ {} }}", render_member(segments, flags, value))
}

fn render_member(segments: &[String], flags: &[bool], value: &str) -> String {
    let key = json_key(&segments[0]);
    if segments.len() == 1 {
        return format!("{key}: {value}");
    }
    let inner = render_skeleton(&segments[1..], &flags[1..], value);
    if flags[0] {
        format!("{key}: [{inner}]")
    } else {
        format!("{key}: {inner}")
    }
}

fn render_path(path: &AttributePath) -> String {
    path.segments()
        .iter()
        .map(|s| quote_name(s))
        .collect::<Vec<_>>()
        .join(".")
}

fn json_key(name: &str) -> String {
    Value::String(name.to_string()).to_string()
}
