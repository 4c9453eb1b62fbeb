//! Node type tag → behavior lookup.
//!
//! Every tag the engine understands resolves to one [`NodeBehavior`]. AI tags
//! carry their canonical instruction template; tool tags carry the tool they
//! call (or defer to `config.toolType` for the generic `tool` tag).

use mangaba_tools::ToolKind;

/// How a tool node chooses its tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolSelector {
    /// The tag names the tool.
    Fixed(ToolKind),
    /// Read `config.toolType`, defaulting to web search.
    Configured,
}

/// What the engine does when it reaches a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeBehavior {
    /// Return the input unchanged.
    PassThrough,
    /// Call the model service under the given instruction template.
    ModelInvocation(&'static str),
    ToolInvocation(ToolSelector),
    /// Wrap the input as the run result.
    ResultSink,
}

impl NodeBehavior {
    pub fn is_model(&self) -> bool {
        matches!(self, Self::ModelInvocation(_))
    }
}

/// Canonical instruction template per AI tag.
pub const MODEL_TEMPLATES: &[(&str, &str)] = &[
    (
        "llm",
        "You are a helpful AI assistant. Process the following input and provide a useful response.",
    ),
    (
        "sentiment",
        "Analyze the sentiment of the following text. Return only the sentiment (positive, negative, or neutral) with a confidence score.",
    ),
    (
        "entity-extraction",
        "Extract all named entities (people, places, organizations, etc.) from the following text. Return them in a structured format.",
    ),
    (
        "keyword-extraction",
        "Extract the most important keywords and phrases from the following text. Return them ranked by importance.",
    ),
    (
        "text-classification",
        "Classify the following text into appropriate categories. Provide the category and confidence level.",
    ),
    (
        "blog-writer",
        "Write a comprehensive blog post about the following topic. Include an engaging title, introduction, main content, and conclusion.",
    ),
    (
        "email-composer",
        "Compose a professional email about the following topic. Include appropriate subject line, greeting, body, and closing.",
    ),
    (
        "social-media",
        "Create engaging social media posts about the following topic. Include hashtags and call-to-action.",
    ),
    (
        "summary-generator",
        "Create a concise summary of the following text. Capture the key points and main ideas.",
    ),
    (
        "translator",
        "Translate the following text to the target language. Maintain the original meaning and tone.",
    ),
    (
        "grammar-checker",
        "Check and correct any grammar, spelling, or punctuation errors in the following text.",
    ),
    (
        "style-enhancer",
        "Improve the writing style and tone of the following text. Make it more engaging and professional.",
    ),
    (
        "code-generator",
        "Generate clean, well-documented code based on the following requirements. Include comments and best practices.",
    ),
    (
        "code-reviewer",
        "Review the following code and provide suggestions for improvement. Focus on best practices, performance, and readability.",
    ),
    (
        "bug-finder",
        "Analyze the following code for potential bugs, errors, or security issues. Provide detailed explanations.",
    ),
    (
        "documentation",
        "Generate comprehensive documentation for the following code or feature. Include usage examples.",
    ),
    (
        "chatbot",
        "You are a helpful chatbot. Respond to the following user message in a friendly and informative manner.",
    ),
    (
        "customer-support",
        "You are a customer support agent. Provide helpful and professional assistance for the following customer inquiry.",
    ),
    (
        "sales-assistant",
        "You are a sales assistant. Help the customer with their inquiry and guide them towards a positive outcome.",
    ),
];

/// Tags handled by the tool handler.
pub const TOOL_TAGS: &[&str] = &["tool", "web-search", "database", "api-call", "calculator"];

/// Instruction template for an AI tag.
pub fn template_for(tag: &str) -> Option<&'static str> {
    MODEL_TEMPLATES
        .iter()
        .find(|(t, _)| *t == tag)
        .map(|(_, template)| *template)
}

/// Resolve a node type tag. `None` means the tag is unknown.
pub fn resolve(tag: &str) -> Option<NodeBehavior> {
    match tag {
        "input" => Some(NodeBehavior::PassThrough),
        "output" => Some(NodeBehavior::ResultSink),
        "tool" => Some(NodeBehavior::ToolInvocation(ToolSelector::Configured)),
        "web-search" | "database" | "api-call" | "calculator" => {
            ToolKind::parse(tag).map(|k| NodeBehavior::ToolInvocation(ToolSelector::Fixed(k)))
        }
        _ => template_for(tag).map(NodeBehavior::ModelInvocation),
    }
}

/// Every tag [`resolve`] accepts.
pub fn known_tags() -> impl Iterator<Item = &'static str> {
    ["input", "output"]
        .into_iter()
        .chain(TOOL_TAGS.iter().copied())
        .chain(MODEL_TEMPLATES.iter().map(|(t, _)| *t))
}
