//! Declarative metadata for every optimizable scalar
//!
//! A [`ParameterDescription`] carries hard bounds (`min_allowed`/`max_allowed`),
//! the current population spread (`min_range`/`max_range`) and the derived
//! [`ParameterType`]. Descriptions can be bound to program variables through
//! shared [`Slot`]s which are written by [`ParameterDescriptionList::set`].

use std::cell::Cell;
use std::fmt;
use std::ops::Index;
use std::rc::Rc;

use crate::checkpoint::{LineReader, fmt_f64, parse_f64, split_words};
use crate::errors::DescriptionError;

/// A program variable a description writes to
pub type Slot = Rc<Cell<f64>>;

/// Create a new slot holding `value`
pub fn slot(value: f64) -> Slot {
    Rc::new(Cell::new(value))
}

/// Distribution family of a parameter, derived from its bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterType {
    Invalid,
    Constant,
    LogDistributed,
    UniformDistributed,
}

impl ParameterType {
    /// Classify a parameter from its bounds
    pub fn classify(min_allowed: f64, max_allowed: f64, min_range: f64, max_range: f64) -> Self {
        let any_nan = [min_allowed, max_allowed, min_range, max_range]
            .iter()
            .any(|v| v.is_nan());
        if any_nan || max_allowed < max_range || max_range < min_range || min_range < min_allowed {
            ParameterType::Invalid
        } else if min_range == max_range {
            ParameterType::Constant
        } else if min_allowed * max_allowed > 0.0 {
            ParameterType::LogDistributed
        } else {
            ParameterType::UniformDistributed
        }
    }

    pub fn is_fit(self) -> bool {
        matches!(
            self,
            ParameterType::LogDistributed | ParameterType::UniformDistributed
        )
    }
}

/// Relative float comparison used for compatibility checks
pub fn floats_differ(x: f64, y: f64) -> bool {
    (x - y).abs() / (x + y + 1.0).abs() > 1.0e-9
}

#[derive(Debug, Clone)]
pub struct ParameterDescription {
    name: String,
    units: String,
    min_allowed: f64,
    max_allowed: f64,
    min_range: f64,
    max_range: f64,
    is_state_parameter: bool,
    kind: ParameterType,
    slots: Vec<Slot>,
}

impl ParameterDescription {
    /// Description with separate allowed bounds and initial range
    pub fn new(
        name: impl Into<String>,
        min_allowed: f64,
        max_allowed: f64,
        min_range: f64,
        max_range: f64,
    ) -> Result<Self, DescriptionError> {
        let mut desc = Self {
            name: name.into(),
            units: String::new(),
            min_allowed,
            max_allowed,
            min_range,
            max_range,
            is_state_parameter: false,
            kind: ParameterType::Invalid,
            slots: Vec::new(),
        };
        desc.check_bounds()?;
        Ok(desc)
    }

    /// Constant parameter, never fitted
    pub fn constant(name: impl Into<String>, value: f64) -> Result<Self, DescriptionError> {
        Self::new(name, value, value, value, value)
    }

    /// Parameter whose initial range equals its allowed bounds
    pub fn ranged(name: impl Into<String>, min: f64, max: f64) -> Result<Self, DescriptionError> {
        Self::new(name, min, max, min, max)
    }

    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = units.into();
        self
    }

    fn check_bounds(&mut self) -> Result<(), DescriptionError> {
        self.kind = ParameterType::classify(
            self.min_allowed,
            self.max_allowed,
            self.min_range,
            self.max_range,
        );
        if self.kind == ParameterType::Invalid {
            return Err(DescriptionError::InvalidBounds {
                name: self.name.clone(),
                min_allowed: self.min_allowed,
                max_allowed: self.max_allowed,
                min_range: self.min_range,
                max_range: self.max_range,
            });
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn units(&self) -> &str {
        &self.units
    }
    pub fn min_allowed(&self) -> f64 {
        self.min_allowed
    }
    pub fn max_allowed(&self) -> f64 {
        self.max_allowed
    }
    pub fn min_range(&self) -> f64 {
        self.min_range
    }
    pub fn max_range(&self) -> f64 {
        self.max_range
    }
    pub fn is_state_parameter(&self) -> bool {
        self.is_state_parameter
    }
    pub fn kind(&self) -> ParameterType {
        self.kind
    }

    pub fn is_valid(&self) -> bool {
        self.kind != ParameterType::Invalid
    }
    pub fn is_constant(&self) -> bool {
        self.kind == ParameterType::Constant
    }
    pub fn is_log_distributed(&self) -> bool {
        self.kind == ParameterType::LogDistributed
    }
    pub fn is_uniform_distributed(&self) -> bool {
        self.kind == ParameterType::UniformDistributed
    }

    /// Change the hard bounds and reclassify
    ///
    /// On error the previous bounds are kept.
    pub fn set_allowed(&mut self, min_allowed: f64, max_allowed: f64) -> Result<(), DescriptionError> {
        let previous = (self.min_allowed, self.max_allowed, self.kind);
        self.min_allowed = min_allowed;
        self.max_allowed = max_allowed;
        self.check_bounds().inspect_err(|_| {
            (self.min_allowed, self.max_allowed, self.kind) = previous;
        })
    }

    /// Change the initial range and reclassify
    ///
    /// On error the previous range is kept.
    pub fn set_range(&mut self, min_range: f64, max_range: f64) -> Result<(), DescriptionError> {
        let previous = (self.min_range, self.max_range, self.kind);
        self.min_range = min_range;
        self.max_range = max_range;
        self.check_bounds().inspect_err(|_| {
            (self.min_range, self.max_range, self.kind) = previous;
        })
    }

    /// The only value a Constant parameter may take
    pub fn default_value(&self) -> Result<f64, DescriptionError> {
        if self.is_constant() {
            Ok(self.min_allowed)
        } else {
            Err(DescriptionError::NoDefault(self.name.clone()))
        }
    }

    /// Current spread: ratio for log parameters, span for uniform ones
    pub fn range(&self) -> Result<f64, DescriptionError> {
        match self.kind {
            ParameterType::Constant => Ok(0.0),
            // negative log parameters have max/min below one
            ParameterType::LogDistributed => {
                let ratio = self.max_range / self.min_range;
                Ok(ratio.max(ratio.recip()))
            }
            ParameterType::UniformDistributed => Ok(self.max_range - self.min_range),
            ParameterType::Invalid => Err(DescriptionError::InvalidRange(self.name.clone())),
        }
    }

    /// Widen the current spread to include `value`
    ///
    /// Spread tracking never reclassifies the parameter.
    pub fn update_range(&mut self, value: f64) -> Result<(), DescriptionError> {
        match self.kind {
            ParameterType::Constant => Err(DescriptionError::ConstantRange(self.name.clone())),
            ParameterType::Invalid => Err(DescriptionError::InvalidRange(self.name.clone())),
            _ => {
                if value > self.max_range {
                    self.max_range = value;
                } else if value < self.min_range {
                    self.min_range = value;
                }
                Ok(())
            }
        }
    }

    /// Collapse the spread onto a single value before re-deriving it
    pub(crate) fn reset_range(&mut self, value: f64) {
        if self.kind.is_fit() {
            self.min_range = value;
            self.max_range = value;
        }
    }

    /// Bind `slot` if `variable` names this parameter
    ///
    /// A Constant parameter immediately writes its default into the slot.
    pub fn match_slot(&mut self, variable: &str, slot: &Slot) -> bool {
        if variable != self.name {
            return false;
        }
        if self.is_constant() {
            slot.set(self.min_allowed);
        }
        self.slots.push(Rc::clone(slot));
        true
    }

    /// Like [`Self::match_slot`], also recording whether this is a state parameter
    pub fn match_state(&mut self, variable: &str, slot: &Slot, is_state: bool) -> bool {
        let matched = self.match_slot(variable, slot);
        if matched {
            self.is_state_parameter = is_state;
        }
        matched
    }

    /// Carry over what the text form does not record: units, state flag and
    /// bound slots
    pub(crate) fn adopt_bindings(&mut self, startup: &ParameterDescription) {
        self.units = startup.units.clone();
        self.is_state_parameter = startup.is_state_parameter;
        self.slots = startup.slots.clone();
    }

    pub fn num_matches(&self) -> usize {
        self.slots.len()
    }

    /// Write `value` to every bound slot
    pub fn set(&self, value: f64) {
        for slot in &self.slots {
            slot.set(value);
        }
    }

    /// Parse one description line
    ///
    /// Accepted forms: `name value`, `name min max`,
    /// `name minAllowed maxAllowed minRange maxRange`. Equal range bounds make
    /// the parameter a Constant, as with [`ParameterDescription::new`].
    pub fn parse_line(line: &str) -> Result<Self, DescriptionError> {
        Self::parse_words(line, false)
    }

    /// Parse a checkpoint line
    ///
    /// Checkpoints write Constants with a single number, so four numbers with
    /// equal range bounds are a fit parameter whose spread collapsed; its
    /// range is reset to the allowed bounds.
    pub(crate) fn parse_checkpoint_line(line: &str) -> Result<Self, DescriptionError> {
        Self::parse_words(line, true)
    }

    fn parse_words(line: &str, widen_collapsed: bool) -> Result<Self, DescriptionError> {
        let words = split_words(line);
        let number = |word: &str| {
            parse_f64(word).ok_or_else(|| DescriptionError::BadNumber {
                word: word.to_string(),
                line: line.trim().to_string(),
            })
        };
        match words.as_slice() {
            [name, value] => Self::constant(*name, number(*value)?),
            [name, min, max] => Self::ranged(*name, number(*min)?, number(*max)?),
            [name, min_allowed, max_allowed, min_range, max_range] => {
                let min_allowed = number(*min_allowed)?;
                let max_allowed = number(*max_allowed)?;
                let mut min_range = number(*min_range)?;
                let mut max_range = number(*max_range)?;
                if widen_collapsed && min_range == max_range && min_allowed < max_allowed {
                    min_range = min_allowed;
                    max_range = max_allowed;
                }
                Self::new(*name, min_allowed, max_allowed, min_range, max_range)
            }
            _ => Err(DescriptionError::BadLine(line.trim().to_string())),
        }
    }
}

/// One line: the shortest form that reproduces the description
impl fmt::Display for ParameterDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<14}", self.name)?;
        if self.is_constant() {
            write!(f, " {}", fmt_f64(self.min_allowed))
        } else if self.min_allowed == self.min_range && self.max_allowed == self.max_range {
            write!(f, " {} {}", fmt_f64(self.min_range), fmt_f64(self.max_range))
        } else {
            write!(
                f,
                " {} {} {} {}",
                fmt_f64(self.min_allowed),
                fmt_f64(self.max_allowed),
                fmt_f64(self.min_range),
                fmt_f64(self.max_range)
            )
        }
    }
}

/// Whether a resumed description could have come from this start-up description
///
/// Names and types must agree; a Constant must keep its value and a fit
/// parameter its allowed bounds. Ranges may differ.
pub fn compatible(startup: &ParameterDescription, resumed: &ParameterDescription) -> bool {
    if startup.name != resumed.name {
        log::warn!("parameter name mismatch: {} != {}", startup.name, resumed.name);
        return false;
    }
    if startup.kind != resumed.kind {
        log::warn!(
            "parameter {} changed type: {:?} != {:?}",
            startup.name,
            startup.kind,
            resumed.kind
        );
        return false;
    }
    let differs = if startup.is_constant() {
        floats_differ(startup.min_allowed, resumed.min_allowed)
    } else {
        floats_differ(startup.min_allowed, resumed.min_allowed)
            || floats_differ(startup.max_allowed, resumed.max_allowed)
    };
    if differs {
        log::warn!("incompatible parameter bounds:\n  {startup}\n  {resumed}");
        return false;
    }
    true
}

/// Ordered, duplicate-free list of descriptions
#[derive(Debug, Clone, Default)]
pub struct ParameterDescriptionList {
    descriptions: Vec<ParameterDescription>,
}

impl ParameterDescriptionList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_descriptions(
        descriptions: impl IntoIterator<Item = ParameterDescription>,
    ) -> Result<Self, DescriptionError> {
        let mut list = Self::new();
        for desc in descriptions {
            list.add(desc)?;
        }
        Ok(list)
    }

    /// Append a description, rejecting duplicate names
    pub fn add(&mut self, desc: ParameterDescription) -> Result<(), DescriptionError> {
        if self.position(&desc.name).is_some() {
            return Err(DescriptionError::Duplicate(desc.name));
        }
        self.descriptions.push(desc);
        Ok(())
    }

    pub fn push_back(&mut self, desc: ParameterDescription) -> Result<(), DescriptionError> {
        self.add(desc)
    }

    pub fn len(&self) -> usize {
        self.descriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptions.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ParameterDescription> {
        self.descriptions.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> std::slice::IterMut<'_, ParameterDescription> {
        self.descriptions.iter_mut()
    }

    pub fn get(&self, name: &str) -> Option<&ParameterDescription> {
        self.position(name).map(|i| &self.descriptions[i])
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.descriptions.iter().position(|d| d.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.descriptions.iter().map(|d| d.name.as_str()).collect()
    }

    /// Bind `slot` to the description called `variable`
    pub fn match_slot(&mut self, variable: &str, slot: &Slot) -> bool {
        self.descriptions
            .iter_mut()
            .any(|d| d.match_slot(variable, slot))
    }

    pub fn match_state(&mut self, variable: &str, slot: &Slot, is_state: bool) -> bool {
        self.descriptions
            .iter_mut()
            .any(|d| d.match_state(variable, slot, is_state))
    }

    pub fn num_matches(&self, variable: &str) -> usize {
        self.get(variable).map_or(0, ParameterDescription::num_matches)
    }

    /// Write each value to the slots of the description at the same position
    pub fn set(&self, values: &[f64]) {
        for (desc, &value) in self.descriptions.iter().zip(values) {
            desc.set(value);
        }
    }

    pub fn num_fit_parameters(&self) -> usize {
        self.descriptions.iter().filter(|d| !d.is_constant()).count()
    }

    pub fn num_fit_regular_parameters(&self) -> usize {
        self.descriptions
            .iter()
            .filter(|d| !d.is_constant() && !d.is_state_parameter)
            .count()
    }

    pub fn num_fit_state_parameters(&self) -> usize {
        self.descriptions
            .iter()
            .filter(|d| !d.is_constant() && d.is_state_parameter)
            .count()
    }

    /// Largest allowed ratio among log-distributed descriptions (at least 1)
    pub fn max_allowed_log_range(&self) -> f64 {
        self.descriptions
            .iter()
            .filter(|d| d.is_log_distributed())
            .map(|d| {
                let ratio = d.max_allowed / d.min_allowed;
                ratio.max(ratio.recip())
            })
            .fold(1.0, f64::max)
    }

    /// Largest allowed span among uniform-distributed descriptions
    pub fn max_allowed_uniform_range(&self) -> f64 {
        self.descriptions
            .iter()
            .filter(|d| d.is_uniform_distributed())
            .map(|d| d.max_allowed - d.min_allowed)
            .fold(0.0, f64::max)
    }

    /// Read a search space: an optional count line, then one description per line
    pub fn parse(text: &str) -> Result<Self, DescriptionError> {
        let mut list = Self::new();
        let mut expected = None;
        for line in text.lines() {
            let words = split_words(line);
            if words.is_empty() {
                continue;
            }
            if expected.is_none() && list.is_empty() && words.len() == 1 {
                let count = words[0]
                    .parse::<usize>()
                    .map_err(|_| DescriptionError::BadLine(line.trim().to_string()))?;
                expected = Some(count);
                continue;
            }
            list.add(ParameterDescription::parse_line(line)?)?;
        }
        if let Some(count) = expected.filter(|&n| n != list.len()) {
            return Err(DescriptionError::BadLine(format!(
                "expected {count} parameter descriptions, found {}",
                list.len()
            )));
        }
        Ok(list)
    }

    /// Read a count line followed by that many descriptions
    pub(crate) fn read_counted(reader: &mut LineReader<'_>) -> Result<Self, crate::PopulationError> {
        let count = reader.count()?;
        let mut list = Self::new();
        for _ in 0..count {
            let line = reader.next_content()?;
            let desc = ParameterDescription::parse_checkpoint_line(line)
                .map_err(|e| reader.error(e.to_string()))?;
            list.add(desc).map_err(|e| reader.error(e.to_string()))?;
        }
        Ok(list)
    }
}

/// Count line followed by one line per description
impl fmt::Display for ParameterDescriptionList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} # parameter descriptions", self.descriptions.len())?;
        for desc in &self.descriptions {
            writeln!(f, "{desc}")?;
        }
        Ok(())
    }
}

impl Index<usize> for ParameterDescriptionList {
    type Output = ParameterDescription;
    fn index(&self, index: usize) -> &Self::Output {
        &self.descriptions[index]
    }
}

impl<'a> IntoIterator for &'a ParameterDescriptionList {
    type Item = &'a ParameterDescription;
    type IntoIter = std::slice::Iter<'a, ParameterDescription>;
    fn into_iter(self) -> Self::IntoIter {
        self.descriptions.iter()
    }
}

/// Whether resumed descriptions are compatible with the start-up ones, position by position
pub fn lists_compatible(startup: &ParameterDescriptionList, resumed: &ParameterDescriptionList) -> bool {
    if startup.len() != resumed.len() {
        log::warn!(
            "parameter description count changed: {} != {}",
            startup.len(),
            resumed.len()
        );
        return false;
    }
    startup
        .iter()
        .zip(resumed.iter())
        .all(|(a, b)| compatible(a, b))
}
