//! Prompt text for the manager, rendered from data so that registering a
//! capability is all it takes to make it routable.

use std::fmt::Write;

use collaborator_core::MessageContext;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CapabilityDescriptor {
    pub name: String,
    pub routing_hint: String,
}

pub fn delegate_tool_name(capability: &str) -> String {
    format!("delegate_to_{capability}")
}

pub fn render_manager_instructions(capabilities: &[CapabilityDescriptor]) -> String {
    let mut text = String::from(
        "You are the Manager of Collaborator, a Microsoft Teams collaboration bot.\n\
         You are activated when the bot is @mentioned in a conversation or messaged directly.\n\
         Analyze each request and decide which specialized capability should handle it.\n\n\
         <AVAILABLE CAPABILITIES>\n",
    );

    if capabilities.is_empty() {
        text.push_str("(none registered)\n");
    }
    for (index, capability) in capabilities.iter().enumerate() {
        let _ = writeln!(
            text,
            "{}. **{}**: call `{}`\n   - Use for: {}",
            index + 1,
            capability.name,
            delegate_tool_name(&capability.name),
            capability.routing_hint
        );
    }

    text.push_str(
        "\n<INSTRUCTIONS>\n\
         1. Understand the user's intent.\n\
         2. If the request mentions any time period (\"yesterday\", \"last week\", \"2 hours ago\", \
         \"this morning\"), call `calculate_time_range` FIRST with the exact phrase.\n\
         3. Delegate to the best matching capability, passing calculated_start_time, \
         calculated_end_time and timespan_description when you have them.\n\
         4. Call `clear_conversation_history` only when the user explicitly asks to clear or reset history.\n\
         5. If no capability fits, answer conversationally and mention what you can help with.\n\n\
         <RESPONSE FORMAT>\n\
         When a capability answers, return its response to the user as-is. Do not add prefixes, \
         commentary or internal reasoning.\n",
    );
    text
}

/// The per-turn user message sent to the manager model.
pub fn render_turn_input(context: &MessageContext) -> String {
    format!(
        "User Request: {}\n\
         Conversation ID: {}\n\
         Current Date/Time: {}\n\
         Default Time Window: {}\n\
         {}\n\n\
         Use calculate_time_range for any time expression before delegating.",
        context.text,
        context.conversation_id,
        context.received_at.to_rfc3339(),
        context.window.describe(),
        context.chat_description()
    )
}

/// Reply used when no capability matches a request in the router modes.
pub fn render_capability_overview(capabilities: &[CapabilityDescriptor]) -> String {
    if capabilities.is_empty() {
        return "I'm not able to help with that yet.".to_string();
    }
    let mut text = String::from("I'm not sure how to help with that. Here is what I can do:\n");
    for capability in capabilities {
        let _ = writeln!(text, "- **{}**: {}", capability.name, capability.routing_hint);
    }
    text
}
