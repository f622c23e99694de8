use crate::llm_provider::Message;

pub const CODE_MARKER: &str = "===CODE===";
pub const AST_MARKER: &str = "===AST===";
pub const SEMANTICS_MARKER: &str = "===SEMANTICS===";

/// Builds the chat messages sent to the completion endpoint.
///
/// The format instructions are advisory: nothing checks that the model
/// followed them, which is why extraction has a fallback.
#[derive(Debug, Clone)]
pub struct PromptComposer {
    language: String,
}

impl Default for PromptComposer {
    fn default() -> Self {
        Self::new("Go")
    }
}

impl PromptComposer {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
        }
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// Messages asking for code plus AST and semantics, each behind its marker.
    pub fn code_generation_messages(&self, intent: &str) -> Vec<Message> {
        let language = &self.language;
        let system = format!(
            "You are an expert code generation system that produces clean, well-structured {language} code based on natural language intents.\n\
             Your response must follow the exact format specified in the user's request, including the special section markers."
        );
        let user = format!(
            "Generate {language} code based on the following intent:\n\
             Intent: \"{intent}\"\n\
             \n\
             The code should be well-structured, follow best practices, and include comments.\n\
             \n\
             Your response MUST use exactly this format with these exact section markers:\n\
             {CODE_MARKER}\n\
             (generated code here)\n\
             {AST_MARKER}\n\
             (JSON representation of AST)\n\
             {SEMANTICS_MARKER}\n\
             (JSON representation of semantic entities and relationships)"
        );
        vec![Message::system(system), Message::user(user)]
    }

    /// Messages asking the model to classify an intent as a JSON object.
    pub fn intent_parsing_messages(&self, intent: &str) -> Vec<Message> {
        let system = "You are an expert intent parsing system that converts natural language development intents into structured JSON.\n\
                      Valid types are: Create, Modify, Delete, Query\n\
                      Valid targets include: Function, Class, Module, Variable, Interface, etc.\n\
                      Always respond with a valid JSON object and nothing else.";
        let user = format!(
            "Parse this development intent and return a JSON object with type, target, constraints, and parameters:\n\
             Intent: \"{intent}\"\n\
             \n\
             Your response should be a valid JSON object like:\n\
             {{\n  \"type\": \"Create\",\n  \"target\": \"Function\",\n  \"constraints\": [\"Must validate input\", \"Must return error on failure\"],\n  \"parameters\": {{\n    \"name\": \"login\",\n    \"returnType\": \"bool\"\n  }}\n}}"
        );
        vec![Message::system(system), Message::user(user)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_provider::MessageRole;

    #[test]
    fn test_code_generation_mandates_markers_in_order() {
        let messages = PromptComposer::default().code_generation_messages("create a login function");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::System);
        assert!(messages[0].content.contains("code generation system"));

        let user = &messages[1].content;
        assert!(user.contains("Intent: \"create a login function\""));
        let code = user.find(CODE_MARKER).unwrap();
        let ast = user.find(AST_MARKER).unwrap();
        let semantics = user.find(SEMANTICS_MARKER).unwrap();
        assert!(code < ast && ast < semantics);
    }

    #[test]
    fn test_language_is_substituted() {
        let messages = PromptComposer::new("Rust").code_generation_messages("make a class");
        assert!(messages[0].content.contains("well-structured Rust code"));
        assert!(messages[1].content.starts_with("Generate Rust code"));
    }

    #[test]
    fn test_intent_parsing_asks_for_json() {
        let messages = PromptComposer::default().intent_parsing_messages("find users");
        assert!(messages[0].content.contains("valid JSON object"));
        assert!(messages[1].content.contains("Intent: \"find users\""));
        assert!(messages[1].content.contains("\"type\": \"Create\""));
        assert!(!messages[1].content.contains(CODE_MARKER));
    }
}
