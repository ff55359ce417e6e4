//! Fetching the per-year source tables and memoizing them for the lifetime of the process.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;

use log::{debug, info, warn};
use polars::prelude::{CsvReadOptions, DataFrame, SerReader};
use serde::{Deserialize, Serialize};
use strum_macros::Display;
use tokio::sync::Mutex;
use tokio::try_join;

use crate::config::Config;
use crate::error::{EjiError, EjiResult};
use crate::schema::normalize_table;
use crate::snapshot::geography_names;
use crate::COL;

/// Logical role of a table within one year's release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[strum(serialize_all = "lowercase")]
pub enum TableRole {
    State,
    County,
    Tract,
}

/// The normalized tables of one published year.
#[derive(Debug)]
pub struct YearData {
    pub year: String,
    pub state: DataFrame,
    pub county: DataFrame,
    pub tract: Option<DataFrame>,
}

impl YearData {
    pub fn table(&self, role: TableRole) -> Option<&DataFrame> {
        match role {
            TableRole::State => Some(&self.state),
            TableRole::County => Some(&self.county),
            TableRole::Tract => self.tract.as_ref(),
        }
    }

    pub fn require(&self, role: TableRole) -> EjiResult<&DataFrame> {
        self.table(role).ok_or_else(|| EjiError::MissingTable {
            role,
            year: self.year.clone(),
        })
    }

    pub fn states(&self) -> EjiResult<Vec<String>> {
        geography_names(&self.state, COL::STATE)
    }

    pub fn counties(&self) -> EjiResult<Vec<String>> {
        geography_names(&self.county, COL::COUNTY)
    }
}

/// Read a CSV with every column as text so identifiers such as `TRACT_FIPS` keep their leading
/// zeros. Metric columns are parsed into numbers when snapshots are built.
pub fn read_csv(bytes: Vec<u8>) -> EjiResult<DataFrame> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .into_reader_with_file_handle(Cursor::new(bytes))
        .finish()?;
    Ok(df)
}

/// Loads the tables of a year on first use and hands out the cached copy afterwards. Published
/// years never change, so nothing is ever evicted.
pub struct DatasetLoader {
    config: Config,
    client: reqwest::Client,
    cache: Mutex<HashMap<String, Arc<YearData>>>,
}

impl DatasetLoader {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn load(&self, year: &str) -> EjiResult<Arc<YearData>> {
        if !self.config.has_year(year) {
            return Err(EjiError::UnknownYear(year.into()));
        }
        if let Some(data) = self.cache.lock().await.get(year) {
            debug!("Using cached tables for {year}");
            return Ok(Arc::clone(data));
        }
        let data = Arc::new(self.fetch_year(year).await?);
        self.cache
            .lock()
            .await
            .insert(year.to_string(), Arc::clone(&data));
        Ok(data)
    }

    async fn fetch_year(&self, year: &str) -> EjiResult<YearData> {
        let (state, county, tract) = try_join!(
            self.fetch_required(TableRole::State, year),
            self.fetch_required(TableRole::County, year),
            self.fetch_table(TableRole::Tract, year),
        )?;
        if tract.is_none() {
            info!("No tract table published for {year}");
        }
        Ok(YearData {
            year: year.to_string(),
            state,
            county,
            tract,
        })
    }

    fn template(&self, role: TableRole) -> &str {
        match role {
            TableRole::State => &self.config.state_file,
            TableRole::County => &self.config.county_file,
            TableRole::Tract => &self.config.tract_file,
        }
    }

    async fn fetch_required(&self, role: TableRole, year: &str) -> EjiResult<DataFrame> {
        let path = self.config.path_for(self.template(role), year);
        self.fetch_table(role, year)
            .await?
            .ok_or_else(|| EjiError::FetchFailed {
                path,
                reason: "not found".into(),
            })
    }

    /// Fetch and normalize one table, `None` if the source does not exist.
    async fn fetch_table(&self, role: TableRole, year: &str) -> EjiResult<Option<DataFrame>> {
        let path = self.config.path_for(self.template(role), year);
        info!("Attempting to load {role} table from {path}");
        let Some(bytes) = self.fetch_bytes(&path).await? else {
            return Ok(None);
        };
        let df = read_csv(bytes).map_err(|e| EjiError::FetchFailed {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        let df = normalize_table(df)?;
        debug!("Loaded {role} table for {year} with shape {:?}", df.shape());
        Ok(Some(df))
    }

    async fn fetch_bytes(&self, path: &str) -> EjiResult<Option<Vec<u8>>> {
        let fetch_failed = |reason: String| EjiError::FetchFailed {
            path: path.to_string(),
            reason,
        };
        if self.config.is_remote() {
            let response = self
                .client
                .get(path)
                .send()
                .await
                .map_err(|e| fetch_failed(e.to_string()))?;
            if response.status() == reqwest::StatusCode::NOT_FOUND {
                warn!("{path} does not exist");
                return Ok(None);
            }
            let bytes = response
                .error_for_status()
                .map_err(|e| fetch_failed(e.to_string()))?
                .bytes()
                .await
                .map_err(|e| fetch_failed(e.to_string()))?;
            Ok(Some(bytes.to_vec()))
        } else {
            match tokio::fs::read(path).await {
                Ok(bytes) => Ok(Some(bytes)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    warn!("{path} does not exist");
                    Ok(None)
                }
                Err(e) => Err(fetch_failed(e.to_string())),
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use httpmock::prelude::*;

    use super::*;

    pub(crate) const STATE_2022: &str = "\
State,Mean_EJI,Mean_EBM,Mean_SVM,Mean_HVM
New Mexico,0.40,0.30,0.71,0.52
Arizona,0.45,0.41,0.60,0.47
";

    pub(crate) const COUNTY_2022: &str = "\
County,Mean_EJI,Mean_EBM,Mean_SVM,Mean_HVM
bernalillo,0.55,0.62,0.58,0.49
Catron County,,0.12,0.66,0.70
lea,0.81,0.90,0.64,0.77
";

    pub(crate) const STATE_2024: &str = "\
State,RPL_EJI,RPL_EBM,RPL_SVM,RPL_HVM,RPL_CBM,RPL_EJI_CBM
New Mexico,0.55,0.30,0.75,0.50,0.44,0.58
Arizona,0.45,0.41,0.60,0.47,0.61,0.50
";

    pub(crate) const COUNTY_2024: &str = "\
County,RPL_EJI,RPL_EBM,RPL_SVM,RPL_HVM,RPL_CBM,RPL_EJI_CBM
Bernalillo County,0.50,0.62,0.60,0.45,0.39,0.52
Catron County,0.33,0.12,0.66,0.70,0.20,0.31
Lea County,0.85,0.88,0.64,0.77,0.92,0.90
";

    pub(crate) const TRACT_2024: &str = "\
GEOID,TRACT_FIPS,RPL_EJI,RPL_THEME_SVM,RPL_THEME_HVM
35001000107,000107,0.61,0.80,0.90
35001000108,000108,0.70,0.80,0.85
35001000109,000109,0.10,0.10,0.20
35001000110,000110,0.15,0.20,0.30
35001000111,000111,0.40,,0.10
35001000112,000112,0.40,0.95,-999
";

    /// Write the fixture tables for both years below `dir`, tracts only for 2024.
    pub(crate) fn write_fixtures(dir: &std::path::Path) {
        let config = Config::default();
        let files = [
            (&config.state_file, "2022", STATE_2022),
            (&config.county_file, "2022", COUNTY_2022),
            (&config.state_file, "2024", STATE_2024),
            (&config.county_file, "2024", COUNTY_2024),
            (&config.tract_file, "2024", TRACT_2024),
        ];
        for (template, year, contents) in files {
            let path = dir.join(template.replace("{year}", year));
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, contents).unwrap();
        }
    }

    #[test]
    fn csv_columns_are_read_as_text() {
        let df = read_csv(TRACT_2024.as_bytes().to_vec()).unwrap();
        let fips = df.column(COL::TRACT_FIPS).unwrap().str().unwrap();
        assert_eq!(fips.get(0), Some("000107"));
        assert_eq!(df.shape(), (6, 5));
    }

    #[tokio::test]
    async fn remote_tables_are_fetched_once() {
        let server = MockServer::start_async().await;
        let state_mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/2024/clean/2024EJI_StateAverages_RPL.csv");
                then.status(200).body(STATE_2024);
            })
            .await;
        let county_mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/2024/clean/2024EJI_NewMexico_CountyMeans.csv");
                then.status(200).body(COUNTY_2024);
            })
            .await;
        let config = Config {
            base_path: server.base_url(),
            ..Config::default()
        };
        let loader = DatasetLoader::new(config);

        let first = loader.load("2024").await.unwrap();
        let second = loader.load("2024").await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        state_mock.assert_hits_async(1).await;
        county_mock.assert_hits_async(1).await;
        // The tract request falls through to a 404, which means "not published"
        assert!(first.tract.is_none());
        assert_eq!(
            first.counties().unwrap(),
            vec!["Bernalillo County", "Catron County", "Lea County"]
        );
    }

    #[tokio::test]
    async fn missing_required_table_is_a_fetch_failure() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/2022/clean/2022EJI_StateAverages_RPL.csv");
                then.status(200).body(STATE_2022);
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/2022/clean/2022EJI_NewMexico_CountyMeans.csv");
                then.status(500);
            })
            .await;
        let loader = DatasetLoader::new(Config {
            base_path: server.base_url(),
            ..Config::default()
        });
        let result = loader.load("2022").await;
        assert!(matches!(result, Err(EjiError::FetchFailed { .. })));
    }

    #[tokio::test]
    async fn local_tables_are_normalized() {
        let dir = tempfile::tempdir().unwrap();
        write_fixtures(dir.path());
        let loader = DatasetLoader::new(Config {
            base_path: dir.path().to_string_lossy().to_string(),
            ..Config::default()
        });

        let data = loader.load("2022").await.unwrap();
        assert!(data.state.column(COL::RPL_EJI).is_ok());
        assert!(data.county.column("Mean_EJI").is_err());
        assert_eq!(
            data.counties().unwrap(),
            vec!["Bernalillo County", "Catron County", "Lea County"]
        );
        assert!(matches!(
            data.require(TableRole::Tract),
            Err(EjiError::MissingTable { .. })
        ));

        let data = loader.load("2024").await.unwrap();
        let tract = data.require(TableRole::Tract).unwrap();
        assert!(tract.column(COL::RPL_SVM).is_ok());
        assert!(tract.column(COL::RPL_HVM).is_ok());
    }

    #[tokio::test]
    async fn unknown_year_is_rejected() {
        let loader = DatasetLoader::new(Config::default());
        assert!(matches!(
            loader.load("1999").await,
            Err(EjiError::UnknownYear(_))
        ));
    }
}
