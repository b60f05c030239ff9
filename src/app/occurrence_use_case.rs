use chrono::NaiveDate;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::app::ports::OccurrencePort;
use crate::config::PipelineConfig;
use crate::constants::{OCCURRENCES_FILE, OCCURRENCE_MAP_FILE, SCIENTIFIC_NAME, THERMAL_CHART_FILE};
use crate::domain::{OccurrencePoint, Table};
use crate::error::{Result, TaxaError};
use crate::infra::{csv_table, svg_map};

/// Everything the occurrence stage produced
#[derive(Debug, Clone)]
pub struct OccurrenceOutcome {
    pub points: Vec<OccurrencePoint>,
    /// Names the occurrence database had nothing for
    pub species_without_points: Vec<String>,
    pub thermal_chart_written: bool,
}

/// Distinct display names in table order
pub fn species_names(table: &Table) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for name in table.column_values(SCIENTIFIC_NAME).filter_map(|v| v.as_text()) {
        let name = name.split_whitespace().collect::<Vec<_>>().join(" ");
        if !name.is_empty() && !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

/// Use case fetching geographic occurrences for the target species and
/// rendering them
pub struct OccurrenceUseCase {
    source: Arc<dyn OccurrencePort>,
    since: NaiveDate,
    limit: u32,
    output_dir: PathBuf,
}

impl OccurrenceUseCase {
    pub fn new(source: Arc<dyn OccurrencePort>, config: &PipelineConfig) -> Self {
        Self {
            source,
            since: config.occurrences.min_date,
            limit: config.occurrences.page_size,
            output_dir: config.output_dir.clone(),
        }
    }

    /// Fetch points for every species in `species`, one name at a time.
    /// A failed fetch aborts; an overall empty answer is an error.
    pub async fn collect(&self, species: &Table) -> Result<(Vec<OccurrencePoint>, Vec<String>)> {
        let names = species_names(species);
        if names.is_empty() {
            return Err(TaxaError::EmptyResult("no species names to fetch occurrences for".to_string()));
        }

        let mut points = Vec::new();
        let mut empty = Vec::new();
        for name in &names {
            let fetched = self.source.fetch(name, self.since, self.limit).await?;
            if fetched.is_empty() {
                warn!(species = %name, "No occurrences found");
                empty.push(name.clone());
            } else {
                debug!(species = %name, points = fetched.len(), "Occurrences fetched");
            }
            points.extend(fetched);
        }

        if points.is_empty() {
            return Err(TaxaError::EmptyResult(format!(
                "no occurrences since {} for any of {} species",
                self.since,
                names.len()
            )));
        }
        info!(species = names.len(), points = points.len(), without_points = empty.len(), "Occurrence fetch complete");
        Ok((points, empty))
    }

    /// Fetch, then write `occurrences.csv`, `occurrence_map.svg` and, when
    /// trait data is supplied, `thermal_ranges.svg`
    pub async fn run(&self, species: &Table, traits: Option<&Table>) -> Result<OccurrenceOutcome> {
        let (points, species_without_points) = self
            .collect(species)
            .instrument(info_span!("occurrences"))
            .await?;

        let map = svg_map::render_occurrence_map(&points);
        let chart = traits.and_then(|t| {
            let chart = svg_map::render_thermal_ranges(t);
            if chart.is_none() {
                warn!("No species with a complete thermal range, chart not rendered");
            }
            chart
        });

        csv_table::write_occurrences(&self.output_dir.join(OCCURRENCES_FILE), &points)?;
        csv_table::write_text(&self.output_dir.join(OCCURRENCE_MAP_FILE), &map)?;
        if let Some(chart) = &chart {
            csv_table::write_text(&self.output_dir.join(THERMAL_CHART_FILE), chart)?;
        }

        Ok(OccurrenceOutcome {
            points,
            species_without_points,
            thermal_chart_written: chart.is_some(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Record;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::tempdir;

    // Mock occurrence source answering from a per-name fixture
    struct MockOccurrenceSource {
        fixtures: HashMap<String, Vec<(f64, f64)>>,
        requested: Arc<Mutex<Vec<String>>>,
    }

    impl MockOccurrenceSource {
        fn new(fixtures: &[(&str, Vec<(f64, f64)>)]) -> Self {
            Self {
                fixtures: fixtures
                    .iter()
                    .map(|(name, coords)| (name.to_string(), coords.clone()))
                    .collect(),
                requested: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn get_requested(&self) -> Vec<String> {
            self.requested.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl OccurrencePort for MockOccurrenceSource {
        async fn fetch(&self, scientific_name: &str, _since: NaiveDate, _limit: u32) -> Result<Vec<OccurrencePoint>> {
            self.requested.lock().unwrap().push(scientific_name.to_string());
            Ok(self
                .fixtures
                .get(scientific_name)
                .map(|coords| {
                    coords
                        .iter()
                        .map(|&(latitude, longitude)| OccurrencePoint {
                            scientific_name: scientific_name.to_string(),
                            latitude,
                            longitude,
                            event_date: NaiveDate::from_ymd_opt(2020, 1, 1),
                            dataset_id: None,
                        })
                        .collect()
                })
                .unwrap_or_default())
        }
    }

    fn species() -> Table {
        Table::from_rows(
            [SCIENTIFIC_NAME],
            vec![
                Record::new().with(SCIENTIFIC_NAME, "Prionace glauca"),
                Record::new().with(SCIENTIFIC_NAME, "Carcharhinus leucas"),
                Record::new().with(SCIENTIFIC_NAME, "Prionace glauca"),
            ],
        )
    }

    fn config(output_dir: PathBuf) -> PipelineConfig {
        PipelineConfig {
            output_dir,
            ..PipelineConfig::default()
        }
    }

    #[tokio::test]
    async fn test_fetches_each_name_once_in_table_order() {
        let dir = tempdir().unwrap();
        let source = Arc::new(MockOccurrenceSource::new(&[(
            "Prionace glauca",
            vec![(10.0, -30.0), (-20.0, 100.0)],
        )]));
        let use_case = OccurrenceUseCase::new(source.clone(), &config(dir.path().to_path_buf()));

        let outcome = use_case.run(&species(), None).await.unwrap();

        assert_eq!(source.get_requested(), vec!["Prionace glauca", "Carcharhinus leucas"]);
        assert_eq!(outcome.points.len(), 2);
        assert_eq!(outcome.species_without_points, vec!["Carcharhinus leucas".to_string()]);
        assert!(!outcome.thermal_chart_written);
        assert!(dir.path().join(OCCURRENCES_FILE).exists());
        assert!(dir.path().join(OCCURRENCE_MAP_FILE).exists());
        assert!(!dir.path().join(THERMAL_CHART_FILE).exists());
    }

    #[tokio::test]
    async fn test_no_points_at_all_is_empty_result() {
        let dir = tempdir().unwrap();
        let source = Arc::new(MockOccurrenceSource::new(&[]));
        let use_case = OccurrenceUseCase::new(source, &config(dir.path().to_path_buf()));

        let result = use_case.run(&species(), None).await;

        assert!(matches!(result, Err(TaxaError::EmptyResult(_))));
        assert!(!dir.path().join(OCCURRENCE_MAP_FILE).exists());
    }

    #[tokio::test]
    async fn test_thermal_chart_written_with_traits() {
        use crate::constants::{TEMP_MAX, TEMP_MIN};

        let dir = tempdir().unwrap();
        let source = Arc::new(MockOccurrenceSource::new(&[("Prionace glauca", vec![(0.0, 0.0)])]));
        let use_case = OccurrenceUseCase::new(source, &config(dir.path().to_path_buf()));
        let traits = Table::from_rows(
            [SCIENTIFIC_NAME, TEMP_MIN, TEMP_MAX],
            vec![Record::new()
                .with(SCIENTIFIC_NAME, "Prionace glauca")
                .with(TEMP_MIN, 8.0)
                .with(TEMP_MAX, 25.0)],
        );

        let outcome = use_case.run(&traits, Some(&traits)).await.unwrap();

        assert!(outcome.thermal_chart_written);
        let chart = std::fs::read_to_string(dir.path().join(THERMAL_CHART_FILE)).unwrap();
        assert!(chart.contains("Prionace glauca"));
    }
}
