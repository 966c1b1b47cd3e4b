//! Prompt construction for LLM requests.
//!
//! Both prompts are fixed text around the question. The generation prompt
//! carries the `app_metrics` schema, two sample rows and the generation rules;
//! the classification prompt carries only the category list.

use crate::classify::Classification;
use crate::llm::types::Message;

/// Schema of the one table the model may query.
pub const SCHEMA_DESCRIPTION: &str = r#"Table: app_metrics
Columns:
- id (integer, primary key)
- app_name (string) - Name of the mobile app (e.g., 'TikTok', 'Instagram')
- platform (string) - 'iOS' or 'Android'
- date (date) - Date of the metrics (YYYY-MM-DD format)
- country (string) - 3-letter country code (e.g., 'USA', 'GBR')
- installs (integer) - Number of app downloads
- in_app_revenue (decimal) - Revenue from in-app purchases
- ads_revenue (decimal) - Revenue from advertisements
- ua_cost (decimal) - User acquisition cost

Available apps: TikTok, Instagram, WhatsApp, Facebook, YouTube, Snapchat, Twitter, LinkedIn, Pinterest, Reddit, Spotify, Netflix, Amazon, Uber, Airbnb, Discord, Twitch, Duolingo, Zoom, PayPal

Available countries: USA, GBR, DEU, FRA, JPN, KOR, CHN, IND, BRA, CAN, AUS, ESP, ITA, NLD, SWE"#;

/// Example rows shown to the model for context.
pub const SAMPLE_ROWS: &str = r#"Example rows:
- TikTok, iOS, 2024-01-15, USA, 15000 installs, $25000 in-app revenue, $8000 ads revenue, $45000 UA cost
- Instagram, Android, 2024-01-15, GBR, 12000 installs, $18000 in-app revenue, $6000 ads revenue, $30000 UA cost"#;

const GENERATION_RULES: &str = r#"IMPORTANT RULES:
1. Generate PostgreSQL-compatible SQL only
2. Use table name "app_metrics" (not AppMetrics)
3. Always include meaningful column aliases
4. For date ranges, assume current timeframe unless specified
5. For "popularity", use total installs as the metric
6. For revenue questions, sum both in_app_revenue and ads_revenue
7. Always use proper aggregation (SUM, COUNT, AVG, etc.)
8. Include ORDER BY for rankings and comparisons
9. Use LIMIT when showing "top" items
10. Handle case-sensitive app names properly

QUERY INTERPRETATION GUIDELINES:
- "How many apps" = COUNT(DISTINCT app_name)
- "Which apps" = List apps with relevant metrics
- "Revenue" = in_app_revenue + ads_revenue unless specified
- "Popularity" = Total installs
- "Performance" = Revenue or ROI depending on context
- Date comparisons should use explicit date ranges"#;

/// Marker that precedes the question in the generation prompt.
pub const QUESTION_MARKER: &str = "USER QUESTION: ";

/// Marker that precedes the question in the classification prompt.
pub const CLASSIFY_QUESTION_MARKER: &str = "Question: ";

/// Heading of the category list in the classification prompt.
pub const CATEGORIES_HEADING: &str = "Categories:";

/// Builds the system prompt for SQL generation.
pub fn build_generation_system_prompt() -> String {
    format!(
        "You are an expert SQL analyst for a mobile app analytics company called Rounds.\n\n\
         DATABASE SCHEMA:\n{SCHEMA_DESCRIPTION}\n\n\
         SAMPLE DATA (for context):\n{SAMPLE_ROWS}\n\n\
         {GENERATION_RULES}"
    )
}

/// Messages asking the model for one SQL statement answering `question`.
pub fn generation_messages(question: &str) -> Vec<Message> {
    vec![
        Message::system(build_generation_system_prompt()),
        Message::user(format!(
            "{QUESTION_MARKER}{question}\n\n\
             CRITICAL: Return ONLY executable SQL. Do not include any explanations, comments, \
             facts about companies, or additional text. Just pure SQL ending with a semicolon:"
        )),
    ]
}

/// Messages asking the model for one category label for `question`.
pub fn classification_messages(question: &str) -> Vec<Message> {
    let categories = Classification::PROMPT_CATEGORIES
        .iter()
        .enumerate()
        .map(|(i, (label, description))| format!("{}. {} - {}", i + 1, label.as_str(), description))
        .collect::<Vec<_>>()
        .join("\n");

    vec![Message::user(format!(
        "Classify this user question about mobile app analytics:\n\n\
         {CLASSIFY_QUESTION_MARKER}{question}\n\n\
         {CATEGORIES_HEADING}\n{categories}\n\n\
         Respond with just the category name:"
    ))]
}

/// Recovers the question from a prompt built by this module.
pub fn extract_question(prompt: &str) -> Option<&str> {
    let marker = if prompt.contains(CATEGORIES_HEADING) {
        CLASSIFY_QUESTION_MARKER
    } else {
        QUESTION_MARKER
    };
    prompt
        .lines()
        .find_map(|line| line.strip_prefix(marker))
        .map(str::trim)
}
