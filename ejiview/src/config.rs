use serde::{Deserialize, Serialize};

/// Placeholders substituted into the file templates.
const YEAR_PLACEHOLDER: &str = "{year}";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Either an `http(s)://` URL or a local directory holding one sub-directory per year.
    pub base_path: String,
    /// The state whose counties are published in the county tables.
    pub state: String,
    /// Years with published data, in the order they are offered.
    pub years: Vec<String>,
    pub state_file: String,
    pub county_file: String,
    pub tract_file: String,
    /// Cells at or above this value are flagged as very high concern.
    pub very_high_threshold: f64,
    /// Default split point of the vulnerability score in the association test.
    pub vulnerability_threshold: f64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            base_path:
                "https://github.com/rileycochrell/rc-EJI-Visualization-NM-3try/raw/refs/heads/main/data"
                    .into(),
            state: "New Mexico".into(),
            years: vec!["2022".into(), "2024".into()],
            state_file: "{year}/clean/{year}EJI_StateAverages_RPL.csv".into(),
            county_file: "{year}/clean/{year}EJI_NewMexico_CountyMeans.csv".into(),
            tract_file: "{year}/clean/{year}EJI_NewMexico_Tracts.csv".into(),
            very_high_threshold: 0.76,
            vulnerability_threshold: 0.75,
        }
    }
}

impl Config {
    /// Full path of a file template for the given year
    pub fn path_for(&self, template: &str, year: &str) -> String {
        format!(
            "{}/{}",
            self.base_path.trim_end_matches('/'),
            template.replace(YEAR_PLACEHOLDER, year)
        )
    }

    pub fn is_remote(&self) -> bool {
        self.base_path.starts_with("http://") || self.base_path.starts_with("https://")
    }

    pub fn has_year(&self, year: &str) -> bool {
        self.years.iter().any(|y| y == year)
    }
}
