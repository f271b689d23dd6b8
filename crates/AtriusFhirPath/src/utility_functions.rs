//! # FHIRPath Utility Functions
//!
//! Implements `now()`, `today()` and `timeOfDay()`. All three read the
//! clock fixed on the [`EvaluationContext`], so repeated calls within one
//! evaluation agree.

use atrius_fhir_model::{PrecisionDate, PrecisionDateTime, PrecisionTime};
use atrius_fhirpath_support::{Collection, EvaluationError, IntoCollection};

use crate::context::EvaluationContext;
use crate::registry::FunctionRegistry;

pub fn register(registry: &mut FunctionRegistry) {
    registry.register_fn("now", 0, 0, now_function);
    registry.register_fn("today", 0, 0, today_function);
    registry.register_fn("timeOfDay", 0, 0, time_of_day_function);
}

pub fn now_function(
    context: &mut EvaluationContext,
    _input: &Collection,
    _arguments: &[Collection],
) -> Result<Collection, EvaluationError> {
    Ok(PrecisionDateTime::from_fixed_offset(&context.now()).to_collection())
}

pub fn today_function(
    context: &mut EvaluationContext,
    _input: &Collection,
    _arguments: &[Collection],
) -> Result<Collection, EvaluationError> {
    Ok(PrecisionDate::from_naive_date(context.now().date_naive()).to_collection())
}

pub fn time_of_day_function(
    context: &mut EvaluationContext,
    _input: &Collection,
    _arguments: &[Collection],
) -> Result<Collection, EvaluationError> {
    Ok(PrecisionTime::from_naive_time(context.now().time()).to_collection())
}
