//! Sorting decision: threshold filter and category reduction.
//!
//! Stateless and pure. One call, one signal; safe to invoke concurrently
//! since every invocation reads only the immutable catalog and the caller's
//! detection slice.

use serde::{Deserialize, Serialize};

use crate::catalog::ClassCatalog;
use crate::{
    Category, ClassifiedDetection, Detection, SortError, SortingSignal, StreamRoute,
};

/// Aggregate decision over one batch of filtered detections.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SortingDecision {
    pub signal: SortingSignal,
    pub decision: StreamRoute,
    pub organic_count: usize,
    pub inorganic_count: usize,
    pub total_count: usize,
}

/// Full classification result: surviving detections plus the decision.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub detections: Vec<ClassifiedDetection>,
    pub sorting_decision: SortingDecision,
}

pub fn validate_threshold(threshold: f32) -> Result<(), SortError> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(SortError::InvalidThreshold(threshold));
    }
    Ok(())
}

/// Reduce a sequence of categories to one signal.
///
/// Set membership is the only decision input; relative counts never matter.
/// A single organic item among any number of inorganic items is MIXED.
pub fn reduce<I>(categories: I) -> SortingSignal
where
    I: IntoIterator<Item = Category>,
{
    let mut organic = false;
    let mut inorganic = false;
    for category in categories {
        match category {
            Category::Organic => organic = true,
            Category::Inorganic => inorganic = true,
        }
    }
    match (organic, inorganic) {
        (false, false) => SortingSignal::Idle,
        (true, false) => SortingSignal::Red,
        (false, true) => SortingSignal::Green,
        (true, true) => SortingSignal::Mixed,
    }
}

/// Decision over already-classified detections: signal, route and counts.
pub fn decide(detections: &[ClassifiedDetection]) -> SortingDecision {
    let organic_count = detections
        .iter()
        .filter(|det| det.category == Category::Organic)
        .count();
    let inorganic_count = detections.len() - organic_count;
    let signal = reduce(detections.iter().map(|det| det.category));
    SortingDecision {
        signal,
        decision: signal.route(),
        organic_count,
        inorganic_count,
        total_count: detections.len(),
    }
}

/// Classify one batch of raw detections.
///
/// Validation happens up front for the whole request: a threshold outside
/// [0, 1] or any inverted bounding box rejects the call before reduction.
/// Detections below the threshold are dropped (the bound is inclusive, so a
/// confidence exactly equal to the threshold is kept); survivors resolve
/// against the catalog, and an unregistered class id fails the whole call.
pub fn evaluate(
    catalog: &ClassCatalog,
    detections: &[Detection],
    threshold: f32,
) -> Result<Classification, SortError> {
    validate_threshold(threshold)?;
    for det in detections {
        det.bbox.validate()?;
    }

    let mut classified = Vec::new();
    for det in detections {
        if det.confidence < threshold {
            continue;
        }
        let entry = catalog.lookup(det.class_id)?;
        classified.push(ClassifiedDetection {
            class_id: det.class_id,
            class_name: entry.class_name.clone(),
            category: entry.category,
            confidence: det.confidence,
            bbox: det.bbox,
        });
    }

    let sorting_decision = decide(&classified);
    Ok(Classification {
        detections: classified,
        sorting_decision,
    })
}
