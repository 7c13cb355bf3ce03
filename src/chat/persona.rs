//! Personas are named presets for the system message that seeds a
//! transcript. Prompts are Handlebars templates, rendered in strict
//! mode so a typo in a template fails loudly instead of producing an
//! empty prompt.

use std::fmt;

use handlebars::Handlebars;
use serde::Serialize;
use serde_json::json;

use super::error::ChatError;

/// Name of the persona that uses the configured system message
/// verbatim.
pub const CUSTOM_PERSONA: &str = "custom";

const ASSISTANT_PROMPT: &str = r"You are {{assistant_name}}, a helpful assistant. Answer clearly and concisely.";

const TUTOR_PROMPT: &str = r"
You are {{assistant_name}}, a patient tutor. Explain ideas step by step, check understanding with short questions and never just hand over the final answer to an exercise.
";

const PROGRAMMER_PROMPT: &str = r"
You are {{assistant_name}}, an experienced software engineer. Prefer working code examples, point out edge cases and say so when you are unsure.
";

const COMEDIAN_PROMPT: &str = r"
You are {{assistant_name}}, a friendly comedian. Keep answers light and playful but still answer the question that was asked.
";

const BUILT_IN: &[(&str, &str)] = &[
    ("assistant", ASSISTANT_PROMPT),
    ("tutor", TUTOR_PROMPT),
    ("programmer", PROGRAMMER_PROMPT),
    ("comedian", COMEDIAN_PROMPT),
];

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Persona {
    name: String,
    system_prompt: String,
}

impl Persona {
    pub fn new(name: &str, system_prompt: &str) -> Self {
        Self {
            name: name.to_string(),
            system_prompt: system_prompt.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }
}

impl fmt::Display for Persona {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Resolves persona names to rendered prompts.
pub struct PersonaRegistry {
    templates: Handlebars<'static>,
    assistant_name: String,
    custom_prompt: String,
}

impl PersonaRegistry {
    pub fn new(assistant_name: &str, custom_prompt: &str) -> Self {
        let mut templates = Handlebars::new();
        templates.set_strict_mode(true);
        // Prompts are plain text, not HTML
        templates.register_escape_fn(handlebars::no_escape);
        for (name, prompt) in BUILT_IN {
            templates
                .register_template_string(name, prompt.trim())
                .expect("Failed to register template");
        }
        Self {
            templates,
            assistant_name: assistant_name.to_string(),
            custom_prompt: custom_prompt.to_string(),
        }
    }

    pub fn names(&self) -> Vec<&'static str> {
        BUILT_IN
            .iter()
            .map(|(name, _)| *name)
            .chain(std::iter::once(CUSTOM_PERSONA))
            .collect()
    }

    /// Look up a persona by name, ignoring case and surrounding space.
    pub fn get(&self, name: &str) -> Result<Persona, ChatError> {
        let name = name.trim().to_lowercase();
        if name == CUSTOM_PERSONA {
            return Ok(Persona::new(CUSTOM_PERSONA, &self.custom_prompt));
        }
        if !self.templates.has_template(&name) {
            return Err(ChatError::UnknownPersona(name));
        }

        let prompt = self
            .templates
            .render(&name, &json!({"assistant_name": self.assistant_name}))
            .map_err(|e| ChatError::InvalidPersona {
                name: name.clone(),
                reason: e.to_string(),
            })?;
        Ok(Persona::new(&name, &prompt))
    }
}
