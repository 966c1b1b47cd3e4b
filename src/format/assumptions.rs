//! Notes on the defaults a question left implicit.

const TIME_WORDS: [&str; 5] = ["day", "week", "month", "year", "date"];
const PLATFORM_WORDS: [&str; 3] = ["ios", "android", "platform"];
const GEO_WORDS: [&str; 4] = ["country", "usa", "europe", "asia"];

/// Bullet lines for each implicit default, in a fixed order.
///
/// `question` must already be lowercased.
pub fn assumptions_for(question: &str) -> Vec<&'static str> {
    let mut notes = Vec::new();

    if question.contains("recent") || question.contains("latest") {
        notes.push("• Using the most recent available data");
    } else if !mentions_any(question, &TIME_WORDS) {
        notes.push("• Including data from all available time periods");
    }

    if !mentions_any(question, &PLATFORM_WORDS) {
        notes.push("• Including both iOS and Android platforms");
    }

    if !mentions_any(question, &GEO_WORDS) {
        notes.push("• Including data from all countries");
    }

    if question.contains("revenue") && !(question.contains("in-app") || question.contains("ads")) {
        notes.push("• Revenue includes both in-app purchases and advertising");
    }

    notes
}

fn mentions_any(question: &str, words: &[&str]) -> bool {
    words.iter().any(|w| question.contains(w))
}

/// The block appended to the answer text, or empty when nothing was assumed.
pub(super) fn assumptions_block(notes: &[&str]) -> String {
    if notes.is_empty() {
        String::new()
    } else {
        format!("\n\n**Assumptions made:**\n{}", notes.join("\n"))
    }
}
