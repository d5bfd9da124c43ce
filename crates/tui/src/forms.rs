//! Scale dialogs: text fields plus validation into a request.

#![forbid(unsafe_code)]

use runboard_core::{ScaleRequest, ScalingMode, Service, WorkerPool};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScaleFormError {
    #[error("invalid instance count")]
    InvalidCount,
    #[error("min instances cannot be greater than max instances")]
    MinAboveMax,
}

fn owning_project(row: &str, fallback: &str) -> String {
    if row.is_empty() { fallback } else { row }.to_string()
}

fn parse_count(s: &str) -> Result<i32, ScaleFormError> {
    s.trim().parse::<i32>().ok().filter(|n| *n >= 0).ok_or(ScaleFormError::InvalidCount)
}

/// Edits the text of whichever field has focus.
pub trait FormFields {
    fn field_count(&self) -> usize;
    fn focus(&self) -> usize;
    fn set_focus(&mut self, idx: usize);
    fn field_mut(&mut self, idx: usize) -> Option<&mut String>;

    fn focus_next(&mut self) {
        let n = self.field_count().max(1);
        self.set_focus((self.focus() + 1) % n);
    }

    fn type_char(&mut self, c: char) {
        let idx = self.focus();
        if let Some(f) = self.field_mut(idx) {
            if c.is_ascii_digit() {
                f.push(c);
            }
        }
    }

    fn backspace(&mut self) {
        let idx = self.focus();
        if let Some(f) = self.field_mut(idx) {
            f.pop();
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServiceScaleForm {
    pub name: String,
    pub region: String,
    /// Project the service row came from.
    pub project: String,
    pub mode: ScalingMode,
    pub manual: String,
    pub min: String,
    pub max: String,
    /// 0 is the mode toggle; text fields follow.
    pub focus: usize,
    pub error: Option<String>,
    pub submitting: bool,
}

impl ServiceScaleForm {
    /// `fallback_project` is used when the row does not carry one.
    pub fn from_service(svc: &Service, fallback_project: &str) -> Self {
        let s = &svc.scaling;
        let num = |n: i32| if n > 0 { n.to_string() } else { String::new() };
        Self {
            name: svc.name.clone(),
            region: svc.region.clone(),
            project: owning_project(&svc.project, fallback_project),
            mode: s.mode,
            manual: num(s.manual_instances),
            min: s.min_instances.to_string(),
            max: num(s.max_instances),
            focus: 1,
            error: None,
            submitting: false,
        }
    }

    pub fn toggle_mode(&mut self) {
        self.mode = match self.mode {
            ScalingMode::Manual => ScalingMode::Automatic,
            ScalingMode::Automatic => ScalingMode::Manual,
        };
        self.focus = 1;
    }

    /// Validate the visible fields. An empty max means "no limit"; a manual count of 0
    /// falls back to automatic scaling.
    pub fn request(&self) -> Result<ScaleRequest, ScaleFormError> {
        match self.mode {
            ScalingMode::Manual => Ok(ScaleRequest::from_counts(0, 0, parse_count(&self.manual)?)),
            ScalingMode::Automatic => {
                let min = parse_count(&self.min)?;
                let max = if self.max.trim().is_empty() { 0 } else { parse_count(&self.max)? };
                if max > 0 && min > max {
                    return Err(ScaleFormError::MinAboveMax);
                }
                Ok(ScaleRequest::Automatic { min, max })
            }
        }
    }

    /// `(label, value)` for each text field of the current mode.
    pub fn fields(&self) -> Vec<(&'static str, &str)> {
        match self.mode {
            ScalingMode::Manual => vec![("Instances", self.manual.as_str())],
            ScalingMode::Automatic => vec![("Min instances", self.min.as_str()), ("Max instances", self.max.as_str())],
        }
    }
}

impl FormFields for ServiceScaleForm {
    fn field_count(&self) -> usize {
        1 + self.fields().len()
    }

    fn focus(&self) -> usize {
        self.focus
    }

    fn set_focus(&mut self, idx: usize) {
        self.focus = idx;
    }

    fn field_mut(&mut self, idx: usize) -> Option<&mut String> {
        match (self.mode, idx) {
            (ScalingMode::Manual, 1) => Some(&mut self.manual),
            (ScalingMode::Automatic, 1) => Some(&mut self.min),
            (ScalingMode::Automatic, 2) => Some(&mut self.max),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerPoolScaleForm {
    pub name: String,
    pub region: String,
    pub project: String,
    pub instances: String,
    pub error: Option<String>,
    pub submitting: bool,
}

impl WorkerPoolScaleForm {
    pub fn from_pool(pool: &WorkerPool, fallback_project: &str) -> Self {
        Self {
            name: pool.name.clone(),
            region: pool.region.clone(),
            project: owning_project(&pool.project, fallback_project),
            instances: pool.manual_instances.map(|n| n.to_string()).unwrap_or_default(),
            error: None,
            submitting: false,
        }
    }

    pub fn request(&self) -> Result<i32, ScaleFormError> {
        parse_count(&self.instances)
    }
}

impl FormFields for WorkerPoolScaleForm {
    fn field_count(&self) -> usize {
        1
    }

    fn focus(&self) -> usize {
        0
    }

    fn set_focus(&mut self, _idx: usize) {}

    fn field_mut(&mut self, idx: usize) -> Option<&mut String> {
        (idx == 0).then_some(&mut self.instances)
    }
}
