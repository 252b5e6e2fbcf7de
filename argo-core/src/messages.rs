//! Everything the end user can be told.

pub const GREETING: &str = "Hello there! I'm your guide to the world's oceans. You can ask me about water temperatures, salinity levels, or the locations of our amazing research floats. What would you like to discover today?";

pub const GENERATION_FAILED: &str = "I couldn't turn that question into a search of the float records. Could you try asking it in a different way?";

pub const EXECUTION_FAILED: &str = "I seem to have hit a snag while searching the ocean depths for that. Could you try asking your question in a different way?";

pub const EMPTY_RESULT: &str = "I searched far and wide in our ocean data but couldn't find anything matching your request. Perhaps you could try asking about a broader topic?";

pub const UNAVAILABLE: &str =
    "Oops! My navigation systems seem to be down. Please try asking again in a few moments.";

pub fn no_context_for_float(float: &str) -> String {
    format!(
        "I'm sorry, but I don't have any specific data for '{float}'. Please select a float I have information about, like the Konkan Coast Float."
    )
}

pub fn answer(explanation: &str, table: &str) -> String {
    format!("{explanation}\n\nData I found:\n<pre>{table}</pre>")
}
