//! Calculation lifecycle for the working recipe
//!
//! A calculation goes `Idle -> Computing -> DescriptionPending -> Ready`.
//! The numeric result exists as soon as `begin` returns; the description
//! arrives later and is only applied if it belongs to the calculation that
//! is still current.

use crate::calculator;
use crate::describe::{Describer, DescriptionRequest, FAILED_DESCRIPTION, PENDING_DESCRIPTION};
use crate::models::{FormulationResult, RecipeInput, SavedRecipe};

pub type RequestId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalculationState {
    Idle,
    Computing,
    DescriptionPending,
    Ready,
}

/// Numeric result with its description still to come
#[derive(Debug, Clone)]
pub struct PendingCalculation {
    pub request_id: RequestId,
    pub result: FormulationResult,
    pub request: DescriptionRequest,
}

/// A resolved description, tagged with the calculation it was made for
#[derive(Debug, Clone, PartialEq)]
pub struct Described {
    pub request_id: RequestId,
    pub description: String,
}

/// Ask the describer for one pending calculation.
///
/// Never fails: a service error becomes the fixed failure marker.
pub async fn describe(describer: &dyn Describer, pending: &PendingCalculation) -> Described {
    match describer.describe(&pending.request).await {
        Ok(description) => Described {
            request_id: pending.request_id,
            description,
        },
        Err(e) => {
            log::warn!("Description for request {} failed: {}", pending.request_id, e);
            Described {
                request_id: pending.request_id,
                description: FAILED_DESCRIPTION.to_string(),
            }
        }
    }
}

/// Holds the current result and hands out request ids
pub struct Workbench {
    state: CalculationState,
    current: Option<(RequestId, FormulationResult)>,
    next_request: RequestId,
    top_oils: usize,
}

impl Workbench {
    pub fn new(top_oils: usize) -> Self {
        Self {
            state: CalculationState::Idle,
            current: None,
            next_request: 1,
            top_oils,
        }
    }

    pub fn state(&self) -> CalculationState {
        self.state
    }

    pub fn current(&self) -> Option<&FormulationResult> {
        self.current.as_ref().map(|(_, result)| result)
    }

    /// The current result, only once its description has settled
    pub fn ready_result(&self) -> Option<&FormulationResult> {
        match self.state {
            CalculationState::Ready => self.current(),
            _ => None,
        }
    }

    fn allocate_id(&mut self) -> RequestId {
        let id = self.next_request;
        self.next_request += 1;
        id
    }

    /// Compute the numbers for a recipe snapshot.
    ///
    /// Starting a calculation drops the previous result. Returns `None` and
    /// leaves the workbench idle with no result when the oils weigh nothing
    /// in total.
    pub fn begin(&mut self, input: &RecipeInput) -> Option<PendingCalculation> {
        self.state = CalculationState::Computing;
        self.current = None;

        let Some(result) = calculator::formulate(input, PENDING_DESCRIPTION) else {
            log::debug!("Total oil weight is zero, nothing to calculate");
            self.state = CalculationState::Idle;
            return None;
        };

        let request_id = self.allocate_id();
        let request = DescriptionRequest::new(&result, &input.oils, self.top_oils);
        self.current = Some((request_id, result.clone()));
        self.state = CalculationState::DescriptionPending;
        log::debug!("Request {} computed, description pending", request_id);

        Some(PendingCalculation {
            request_id,
            result,
            request,
        })
    }

    /// Apply a resolved description if its calculation is still current
    pub fn settle(&mut self, described: Described) -> Option<&FormulationResult> {
        match &mut self.current {
            Some((id, result)) if *id == described.request_id => {
                *result = result.with_description(described.description);
                self.state = CalculationState::Ready;
                Some(&*result)
            }
            _ => {
                log::debug!(
                    "Dropping description for superseded request {}",
                    described.request_id
                );
                None
            }
        }
    }

    /// Show a saved recipe's stored result without recomputing it
    pub fn load(&mut self, recipe: &SavedRecipe) -> RecipeInput {
        let request_id = self.allocate_id();
        self.current = Some((request_id, recipe.results.clone()));
        self.state = CalculationState::Ready;
        recipe.to_input()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::describe::{DescribeError, OfflineDescriber};
    use crate::models::{AdditiveEntry, FattyAcidProfile, OilLine, OilSpec};
    use async_trait::async_trait;

    struct Scripted(&'static str);

    #[async_trait]
    impl Describer for Scripted {
        async fn describe(&self, request: &DescriptionRequest) -> Result<String, DescribeError> {
            Ok(format!("{} ({})", self.0, request.top_oils.join(", ")))
        }
    }

    fn olive(weight: f64) -> OilLine {
        OilLine {
            oil: OilSpec {
                name: "Olive Oil".to_string(),
                sap: 0.135,
                ins: 109.0,
                fatty_acids: FattyAcidProfile {
                    palmitic: 14.0,
                    stearic: 3.0,
                    oleic: 69.0,
                    linoleic: 12.0,
                    linolenic: 1.0,
                    ..Default::default()
                },
            },
            weight,
        }
    }

    async fn calculate(
        bench: &mut Workbench,
        describer: &dyn Describer,
        input: &RecipeInput,
    ) -> Option<FormulationResult> {
        let pending = bench.begin(input)?;
        let described = describe(describer, &pending).await;
        bench.settle(described).cloned()
    }

    fn input(weight: f64) -> RecipeInput {
        RecipeInput {
            oils: vec![olive(weight)],
            superfat: 5.0,
            water_percent: 33.0,
            essential_oils: vec![
                AdditiveEntry::new("Lavender", 20.0),
                AdditiveEntry::new("", 5.0),
            ],
            powders: Vec::new(),
        }
    }

    #[test]
    fn numbers_are_available_before_the_description() {
        let mut bench = Workbench::new(3);
        let pending = bench.begin(&input(1000.0)).unwrap();

        assert_eq!(bench.state(), CalculationState::DescriptionPending);
        assert_eq!(pending.result.description, PENDING_DESCRIPTION);
        assert_eq!(pending.result.essential_oils.len(), 1);
        assert_eq!(bench.current(), Some(&pending.result));
        assert!(bench.ready_result().is_none());
    }

    #[test]
    fn zero_weight_leaves_workbench_idle() {
        let mut bench = Workbench::new(3);
        assert!(bench.begin(&input(0.0)).is_none());
        assert_eq!(bench.state(), CalculationState::Idle);
        assert!(bench.current().is_none());
    }

    #[tokio::test]
    async fn zero_weight_after_a_result_returns_to_idle() {
        let mut bench = Workbench::new(3);
        calculate(&mut bench, &Scripted("ok"), &input(1000.0)).await.unwrap();
        assert_eq!(bench.state(), CalculationState::Ready);

        assert!(bench.begin(&input(0.0)).is_none());
        assert_eq!(bench.state(), CalculationState::Idle);
        assert!(bench.current().is_none());
        assert!(bench.ready_result().is_none());
    }

    #[tokio::test]
    async fn zero_weight_drops_in_flight_description() {
        let mut bench = Workbench::new(3);
        let pending = bench.begin(&input(1000.0)).unwrap();
        assert!(bench.begin(&input(0.0)).is_none());

        let late = describe(&Scripted("late"), &pending).await;
        assert!(bench.settle(late).is_none());
        assert_eq!(bench.state(), CalculationState::Idle);
        assert!(bench.current().is_none());
    }

    #[tokio::test]
    async fn description_replaces_placeholder_only() {
        let mut bench = Workbench::new(3);
        let pending = bench.begin(&input(1000.0)).unwrap();
        let described = describe(&Scripted("Gentle bar"), &pending).await;
        let settled = bench.settle(described).unwrap().clone();

        assert_eq!(settled.description, "Gentle bar (Olive Oil)");
        assert_eq!(settled.properties, pending.result.properties);
        assert_eq!(settled.fatty_acid_profile, pending.result.fatty_acid_profile);
        assert_eq!(bench.state(), CalculationState::Ready);
    }

    #[tokio::test]
    async fn failed_description_still_reaches_ready() {
        let mut bench = Workbench::new(3);
        let result = calculate(&mut bench, &OfflineDescriber::new("down"), &input(1000.0))
            .await
            .unwrap();

        assert_eq!(result.description, FAILED_DESCRIPTION);
        assert!((result.properties.lye_amount - 128.25).abs() < 1e-9);
        assert_eq!(bench.state(), CalculationState::Ready);
        assert!(bench.ready_result().is_some());
    }

    #[tokio::test]
    async fn superseded_description_is_dropped() {
        let mut bench = Workbench::new(3);
        let first = bench.begin(&input(1000.0)).unwrap();
        let second = bench.begin(&input(500.0)).unwrap();
        assert_ne!(first.request_id, second.request_id);

        let late = describe(&Scripted("stale"), &first).await;
        assert!(bench.settle(late).is_none());
        assert_eq!(bench.state(), CalculationState::DescriptionPending);
        assert_eq!(bench.current().unwrap().properties.total_weight, 500.0);

        let fresh = describe(&Scripted("fresh"), &second).await;
        let settled = bench.settle(fresh).unwrap();
        assert!(settled.description.starts_with("fresh"));
        assert_eq!(settled.properties.total_weight, 500.0);
    }

    #[test]
    fn loading_restores_stored_result_verbatim() {
        let mut bench = Workbench::new(3);
        let mut stored = calculator::formulate(&input(1000.0), "stored text").unwrap();
        // Deliberately not what a recomputation would give
        stored.properties.lye_amount = 1.0;

        let recipe = SavedRecipe {
            id: "r1".to_string(),
            name: "Castile".to_string(),
            oils: vec![olive(1000.0)],
            superfat: 5.0,
            water_as_percent_of_oils: 0.0,
            essential_oils: Vec::new(),
            powders: Vec::new(),
            results: stored.clone(),
        };

        let restored = bench.load(&recipe);
        assert_eq!(bench.ready_result(), Some(&stored));
        assert_eq!(restored.water_percent, 33.0);
    }
}
