//! Variable substitution for action parameters.
//!
//! Templates use `{{ path }}` placeholders where the path is a dotted context
//! field path. Rendering happens immediately before an action runs, so
//! placeholders always see the context as it was when the event fired.

use crate::action::ActionParams;
use crate::context::{ExecutionContext, value_text};
use crate::error::TemplateError;

/// Renders a template string against a context.
///
/// Text outside placeholders passes through unchanged. An opening `{{` with
/// no closing `}}`, or a placeholder with an empty path, is treated as
/// literal text rather than a variable.
///
/// # Errors
///
/// Returns [`TemplateError::UnresolvedVariable`] when a placeholder path has
/// no value in the context. The caller gets no partial output.
pub fn render(template: &str, context: &ExecutionContext) -> Result<String, TemplateError> {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        let after_open = &rest[open + 2..];
        let Some(close) = after_open.find("}}") else {
            // Unterminated placeholder, keep the tail verbatim.
            break;
        };

        let path = after_open[..close].trim();
        if path.is_empty() {
            output.push_str(&rest[..open + 2]);
            rest = after_open;
            continue;
        }

        let Some(value) = context.lookup(path) else {
            return Err(TemplateError::UnresolvedVariable {
                path: path.to_string(),
            });
        };

        output.push_str(&rest[..open]);
        output.push_str(&value_text(value));
        rest = &after_open[close + 2..];
    }

    output.push_str(rest);
    Ok(output)
}

/// Renders every value of an action's parameter map.
///
/// # Errors
///
/// Fails on the first unresolved variable across all parameters.
pub fn render_params(
    params: &ActionParams,
    context: &ExecutionContext,
) -> Result<ActionParams, TemplateError> {
    params
        .iter()
        .map(|(key, value)| Ok((key.clone(), render(value, context)?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Namespace;
    use serde_json::json;

    fn context() -> ExecutionContext {
        ExecutionContext::builder()
            .field(Namespace::Contact, "name", json!("Ana"))
            .field(Namespace::Contact, "priority", json!(7))
            .field(Namespace::Event, "location", json!({"city": "Lisbon"}))
            .build()
    }

    #[test]
    fn renders_plain_text_untouched() {
        assert_eq!(render("no variables here", &context()).unwrap(), "no variables here");
        assert_eq!(render("", &context()).unwrap(), "");
    }

    #[test]
    fn substitutes_variables() {
        let out = render("Hi {{contact.name}}, see you soon!", &context()).unwrap();
        assert_eq!(out, "Hi Ana, see you soon!");
    }

    #[test]
    fn whitespace_inside_braces_is_ignored() {
        let out = render("Hi {{ contact.name }}!", &context()).unwrap();
        assert_eq!(out, "Hi Ana!");
    }

    #[test]
    fn substitutes_multiple_variables() {
        let out = render(
            "{{contact.name}} ({{contact.priority}}) in {{event.location.city}}",
            &context(),
        )
        .unwrap();
        assert_eq!(out, "Ana (7) in Lisbon");
    }

    #[test]
    fn non_string_values_render_as_text() {
        let out = render("priority={{contact.priority}}", &context()).unwrap();
        assert_eq!(out, "priority=7");
    }

    #[test]
    fn unresolved_variable_is_an_error() {
        let err = render("Hi {{contact.email}}", &context()).unwrap_err();
        assert_eq!(
            err,
            TemplateError::UnresolvedVariable {
                path: "contact.email".to_string()
            }
        );
    }

    #[test]
    fn unterminated_placeholder_is_literal() {
        let out = render("Hi {{contact.name", &context()).unwrap();
        assert_eq!(out, "Hi {{contact.name");
    }

    #[test]
    fn empty_placeholder_is_literal() {
        let out = render("braces {{}} stay", &context()).unwrap();
        assert_eq!(out, "braces {{}} stay");
    }

    #[test]
    fn render_params_maps_every_value() {
        let params = ActionParams::from([
            ("to".to_string(), "{{contact.name}}".to_string()),
            ("body".to_string(), "Hello from {{event.location.city}}".to_string()),
        ]);

        let rendered = render_params(&params, &context()).unwrap();
        assert_eq!(rendered["to"], "Ana");
        assert_eq!(rendered["body"], "Hello from Lisbon");
    }

    #[test]
    fn render_params_fails_on_first_unresolved() {
        let params = ActionParams::from([
            ("to".to_string(), "{{contact.name}}".to_string()),
            ("cc".to_string(), "{{contact.email}}".to_string()),
        ]);

        let err = render_params(&params, &context()).unwrap_err();
        assert_eq!(
            err,
            TemplateError::UnresolvedVariable {
                path: "contact.email".to_string()
            }
        );
    }
}
