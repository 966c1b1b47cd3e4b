//! Deterministic `app_metrics` rows for local stores and tests.

/// One row of the `app_metrics` table.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRow {
    pub app_name: String,
    pub platform: String,
    pub date: String,
    pub country: String,
    pub installs: i64,
    pub in_app_revenue: f64,
    pub ads_revenue: f64,
    pub ua_cost: f64,
}

const FIXTURE_APPS: [(&str, i64); 5] = [
    ("TikTok", 15_000),
    ("Instagram", 12_000),
    ("WhatsApp", 9_000),
    ("Spotify", 6_000),
    ("Zoom", 3_000),
];
const FIXTURE_PLATFORMS: [&str; 2] = ["iOS", "Android"];
const FIXTURE_COUNTRIES: [&str; 3] = ["USA", "GBR", "DEU"];
const FIXTURE_DATES: [&str; 2] = ["2024-01-15", "2024-02-15"];

/// Returns 60 rows: five apps on both platforms, three countries, two dates.
///
/// Figures are derived from the row position, so every call yields the same
/// data and aggregates are stable across runs.
pub fn fixture_rows() -> Vec<MetricRow> {
    let mut rows = Vec::with_capacity(
        FIXTURE_APPS.len() * FIXTURE_PLATFORMS.len() * FIXTURE_COUNTRIES.len() * FIXTURE_DATES.len(),
    );

    for (app_name, base_installs) in FIXTURE_APPS {
        for (p, platform) in FIXTURE_PLATFORMS.iter().enumerate() {
            for (c, country) in FIXTURE_COUNTRIES.iter().enumerate() {
                for (d, date) in FIXTURE_DATES.iter().enumerate() {
                    // Android trails iOS, later countries trail earlier ones.
                    let installs = base_installs - (p as i64) * 2_000 - (c as i64) * 1_000
                        + (d as i64) * 500;
                    let in_app_revenue = installs as f64 * 1.5;
                    let ads_revenue = installs as f64 * 0.5;
                    let ua_cost = installs as f64 * 2.25;

                    rows.push(MetricRow {
                        app_name: app_name.to_string(),
                        platform: platform.to_string(),
                        date: date.to_string(),
                        country: country.to_string(),
                        installs,
                        in_app_revenue,
                        ads_revenue,
                        ua_cost,
                    });
                }
            }
        }
    }

    rows
}
