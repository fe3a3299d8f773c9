use crate::parameter_description::ParameterDescription;

/// Clamp `value` into the allowed bounds of `desc`
///
/// NaN lands on the upper bound.
pub(crate) fn clip_allowed(value: f64, desc: &ParameterDescription) -> f64 {
    if value < desc.min_allowed() {
        desc.min_allowed()
    } else if !(value <= desc.max_allowed()) {
        desc.max_allowed()
    } else {
        value
    }
}
