// MIT License - Copyright (c) 2026 Peter Wright
// Maps parsed events and poll results onto externally bound items

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use evalexpr::Value;
use tracing::{debug, trace, warn};

use crate::error::{PanelError, Result};
use crate::parser::ParsedEvent;
use crate::transport::command::CommandSession;

/// Characters that mark a binding variable as an arithmetic expression.
const EXPRESSION_OPERATORS: [char; 6] = ['+', '-', '*', '/', '^', '%'];

/// What a binding polls with a synchronous command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandType {
    /// `RAS n` - area status code
    AreaStatus(u32),
    /// `RZS n` - zone status code
    ZoneStatus(u32),
    /// `Zone n` - zone status code, also fed by zone events
    Zone(u32),
    /// `User n` - fed by user events only
    User(u32),
    /// `PowerState`
    PowerState,
    /// `Err_code` - module error code
    ErrorCode,
    /// `Err_msg` - module error message
    ErrorMessage,
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandType::AreaStatus(n) => write!(f, "RAS {}", n),
            CommandType::ZoneStatus(n) => write!(f, "RZS {}", n),
            CommandType::Zone(n) => write!(f, "Zone {}", n),
            CommandType::User(n) => write!(f, "User {}", n),
            CommandType::PowerState => f.write_str("PowerState"),
            CommandType::ErrorCode => f.write_str("Err_code"),
            CommandType::ErrorMessage => f.write_str("Err_msg"),
        }
    }
}

impl FromStr for CommandType {
    type Err = PanelError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || PanelError::Config {
            details: format!("invalid command type '{}'", s),
        };

        match s.trim() {
            "PowerState" => return Ok(CommandType::PowerState),
            "Err_code" => return Ok(CommandType::ErrorCode),
            "Err_msg" => return Ok(CommandType::ErrorMessage),
            _ => {}
        }

        let (name, index) = s.trim().split_once(char::is_whitespace).ok_or_else(invalid)?;
        let index: u32 = index.trim().parse().map_err(|_| invalid())?;
        match name {
            "RAS" => Ok(CommandType::AreaStatus(index)),
            "RZS" => Ok(CommandType::ZoneStatus(index)),
            "Zone" => Ok(CommandType::Zone(index)),
            "User" => Ok(CommandType::User(index)),
            _ => Err(invalid()),
        }
    }
}

/// Value produced for an item.
#[derive(Debug, Clone, PartialEq)]
pub enum PolledValue {
    Number(f64),
    Text(String),
}

impl PolledValue {
    fn from_text(text: String) -> Self {
        match text.trim().parse::<f64>() {
            Ok(n) => PolledValue::Number(n),
            Err(_) => PolledValue::Text(text),
        }
    }
}

impl fmt::Display for PolledValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolledValue::Number(n) => write!(f, "{}", n),
            PolledValue::Text(s) => f.write_str(s),
        }
    }
}

/// Run the synchronous query behind a command type.
pub async fn poll(session: &mut CommandSession<'_>, command_type: CommandType) -> Result<PolledValue> {
    let value = match command_type {
        CommandType::AreaStatus(area) => {
            PolledValue::Number(f64::from(session.query_area_status(area).await?.code()))
        }
        CommandType::ZoneStatus(zone) | CommandType::Zone(zone) => {
            PolledValue::Number(f64::from(session.query_zone_status(zone).await?.code()))
        }
        CommandType::PowerState => PolledValue::Number(session.power_state().await? as f64),
        CommandType::ErrorCode => PolledValue::Number(session.error_code().await? as f64),
        CommandType::ErrorMessage => PolledValue::Text(session.error_string().await?),
        CommandType::User(_) => {
            return Err(PanelError::Unsupported {
                what: command_type.to_string(),
            });
        }
    };
    debug!("Polled {} = {}", command_type, value);
    Ok(value)
}

/// Transformation applied to a value before it reaches the item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transformation {
    /// Service name, e.g. `MAP`
    pub kind: String,
    /// Service argument, e.g. `alarm.map`
    pub function: String,
}

/// Binding of one external item to a device variable.
#[derive(Debug, Clone)]
pub struct Binding {
    pub item: String,
    pub device: String,
    /// Event key, or an expression over event keys
    pub variable: String,
    pub command: Option<CommandType>,
    pub refresh: Duration,
    pub transformation: Option<Transformation>,
}

impl Binding {
    pub fn new(item: impl Into<String>, device: impl Into<String>, variable: impl Into<String>) -> Self {
        Self {
            item: item.into(),
            device: device.into(),
            variable: variable.into(),
            command: None,
            refresh: Duration::ZERO,
            transformation: None,
        }
    }

    pub fn with_command(mut self, command: CommandType, refresh: Duration) -> Self {
        self.command = Some(command);
        self.refresh = refresh;
        self
    }

    pub fn with_transformation(mut self, kind: impl Into<String>, function: impl Into<String>) -> Self {
        self.transformation = Some(Transformation {
            kind: kind.into(),
            function: function.into(),
        });
        self
    }

    fn is_expression(&self) -> bool {
        self.variable.contains(EXPRESSION_OPERATORS)
    }
}

/// Evaluates arithmetic expressions over substituted event values.
pub trait ExpressionEvaluator: Send + Sync {
    fn evaluate(&self, expression: &str) -> Result<f64>;
}

/// Expression evaluator backed by `evalexpr`.
#[derive(Debug, Default, Clone, Copy)]
pub struct EvalexprEvaluator;

impl ExpressionEvaluator for EvalexprEvaluator {
    fn evaluate(&self, expression: &str) -> Result<f64> {
        let error = |reason: String| PanelError::Expression {
            expression: expression.to_string(),
            reason,
        };
        match evalexpr::eval(expression) {
            Ok(Value::Int(n)) => Ok(n as f64),
            Ok(Value::Float(n)) => Ok(n),
            Ok(other) => Err(error(format!("expected a number, got {:?}", other))),
            Err(e) => Err(error(e.to_string())),
        }
    }
}

/// A named value transformation (e.g. a lookup map).
pub trait TransformationService: Send + Sync {
    fn transform(&self, function: &str, value: &str) -> Result<String>;
}

/// Transformation services by kind.
#[derive(Default)]
pub struct TransformationRegistry {
    services: HashMap<String, Box<dyn TransformationService>>,
}

impl TransformationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: impl Into<String>, service: Box<dyn TransformationService>) {
        self.services.insert(kind.into(), service);
    }

    /// Apply a transformation, passing the value through when no service
    /// is registered for its kind.
    pub fn apply(&self, transformation: &Transformation, value: PolledValue) -> Result<PolledValue> {
        let Some(service) = self.services.get(&transformation.kind) else {
            warn!(
                "No transformation service for {}, passing value through",
                transformation.kind
            );
            return Ok(value);
        };
        let output = service
            .transform(&transformation.function, &value.to_string())
            .map_err(|e| PanelError::Transformation {
                kind: transformation.kind.clone(),
                function: transformation.function.clone(),
                reason: e.to_string(),
            })?;
        Ok(PolledValue::from_text(output))
    }
}

/// New value for an item.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub item: String,
    pub value: PolledValue,
}

/// Matches bindings against event values.
pub struct Dispatcher {
    bindings: Vec<Binding>,
    evaluator: Box<dyn ExpressionEvaluator>,
    transformations: TransformationRegistry,
}

impl Dispatcher {
    pub fn new(bindings: Vec<Binding>) -> Self {
        Self {
            bindings,
            evaluator: Box::new(EvalexprEvaluator),
            transformations: TransformationRegistry::new(),
        }
    }

    pub fn with_evaluator(mut self, evaluator: Box<dyn ExpressionEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn with_transformations(mut self, transformations: TransformationRegistry) -> Self {
        self.transformations = transformations;
        self
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    /// Bindings that poll on a schedule.
    pub fn polled_bindings(&self) -> impl Iterator<Item = (&Binding, CommandType)> {
        self.bindings
            .iter()
            .filter_map(|b| b.command.map(|command| (b, command)))
    }

    /// Updates produced by one event from `device`.
    pub fn dispatch(&self, device: &str, event: &ParsedEvent) -> Vec<Update> {
        let values = event.values();
        let mut updates = Vec::new();

        for binding in self.bindings.iter().filter(|b| b.device == device) {
            let value = match self.match_binding(binding, &values) {
                Ok(Some(value)) => value,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Binding {} skipped: {}", binding.item, e);
                    continue;
                }
            };

            match self.transform(binding, PolledValue::Number(value)) {
                Ok(value) => {
                    trace!("{} <- {}", binding.item, value);
                    updates.push(Update {
                        item: binding.item.clone(),
                        value,
                    });
                }
                Err(e) => warn!("Binding {} skipped: {}", binding.item, e),
            }
        }

        updates
    }

    /// Pass a value through the binding's transformation, if any.
    pub fn transform(&self, binding: &Binding, value: PolledValue) -> Result<PolledValue> {
        match &binding.transformation {
            Some(transformation) => self.transformations.apply(transformation, value),
            None => Ok(value),
        }
    }

    fn match_binding(&self, binding: &Binding, values: &BTreeMap<String, i64>) -> Result<Option<f64>> {
        for (key, value) in values {
            if binding.variable == *key {
                return Ok(Some(*value as f64));
            }
            if binding.is_expression() && !key_positions(&binding.variable, key).is_empty() {
                let expression = substitute(&binding.variable, values);
                return self.evaluator.evaluate(&expression).map(Some);
            }
        }
        Ok(None)
    }
}

/// Replace every event key in `variable` by its value, longest keys first.
fn substitute(variable: &str, values: &BTreeMap<String, i64>) -> String {
    let mut keys: Vec<&String> = values.keys().collect();
    keys.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    keys.into_iter().fold(variable.to_string(), |mut expr, key| {
        let value = values[key].to_string();
        for pos in key_positions(&expr, key).into_iter().rev() {
            expr.replace_range(pos..pos + key.len(), &value);
        }
        expr
    })
}

/// Byte offsets where `key` occurs as a whole token, so `Zone 1` never
/// matches inside `Zone 10`.
fn key_positions(text: &str, key: &str) -> Vec<usize> {
    text.match_indices(key)
        .map(|(pos, _)| pos)
        .filter(|&pos| {
            let before = text[..pos].chars().next_back();
            let after = text[pos + key.len()..].chars().next();
            !before.is_some_and(is_word_char) && !after.is_some_and(is_word_char)
        })
        .collect()
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Last successful update per item, for the poll scheduler.
#[derive(Debug, Default)]
pub struct RefreshTracker {
    last_update: HashMap<String, Instant>,
}

impl RefreshTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `item` has not been updated within `interval` of `now`.
    pub fn is_due(&self, item: &str, interval: Duration, now: Instant) -> bool {
        match self.last_update.get(item) {
            Some(last) => now.saturating_duration_since(*last) >= interval,
            None => true,
        }
    }

    pub fn mark_updated(&mut self, item: &str, now: Instant) {
        self.last_update.insert(item.to_string(), now);
    }
}
