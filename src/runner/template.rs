//! `{variable}` substitution for runner command lines.
//!
//! `{{` and `}}` render literal braces. Undefined variables are an error
//! rather than an empty substitution, so a typo in a configured command
//! fails loudly instead of running something else.

use std::collections::BTreeMap;
use thiserror::Error;

/// Error type for template rendering failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("undefined variable '{name}' at position {position} in command template")]
    UndefinedVariable { name: String, position: usize },

    #[error("unmatched '{{' at position {position} in command template")]
    UnmatchedBrace { position: usize },

    #[error("empty variable name at position {position} in command template")]
    EmptyVariableName { position: usize },
}

/// Variables available to a command template.
pub type Vars<'a> = BTreeMap<&'static str, &'a str>;

/// Render `template`, substituting every `{name}` from `vars`.
pub fn render(template: &str, vars: &Vars<'_>) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((pos, ch)) = chars.next() {
        match ch {
            '{' if matches!(chars.peek(), Some((_, '{'))) => {
                chars.next();
                out.push('{');
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some((_, '}')) => break,
                        Some((_, c)) => name.push(c),
                        None => return Err(TemplateError::UnmatchedBrace { position: pos }),
                    }
                }

                let name = name.trim();
                if name.is_empty() {
                    return Err(TemplateError::EmptyVariableName { position: pos });
                }
                match vars.get(name) {
                    Some(value) => out.push_str(value),
                    None => {
                        return Err(TemplateError::UndefinedVariable {
                            name: name.to_string(),
                            position: pos,
                        });
                    }
                }
            }
            '}' if matches!(chars.peek(), Some((_, '}'))) => {
                chars.next();
                out.push('}');
            }
            _ => out.push(ch),
        }
    }

    Ok(out)
}
