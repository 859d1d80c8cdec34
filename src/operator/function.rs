use crate::graph::Value;
use ahash::AHashMap;
use std::fmt;
use std::sync::Arc;

/// A pure value-to-value function used by Transform nodes.
#[derive(Clone)]
pub struct TransformFn(Arc<dyn Fn(&Value) -> Value + Send + Sync>);

impl TransformFn {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn call(&self, value: &Value) -> Value {
        (self.0)(value)
    }
}

/// A side-effecting function used by Effect nodes.
#[derive(Clone)]
pub struct EffectFn(Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>);

impl EffectFn {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn call(&self, value: &Value) -> Result<(), String> {
        (self.0)(value)
    }
}

/// What a custom function sees when its node is evaluated.
#[derive(Debug)]
pub struct CustomInput<'a> {
    /// Current value of every target port, in port order.
    pub inputs: &'a [Option<Value>],
    /// Index of the target port that triggered this evaluation, `None` at mount.
    pub changed: Option<usize>,
    pub state: Option<&'a Value>,
}

/// What a custom function hands back to the engine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CustomOutput {
    /// One entry per source port; `None` leaves that port silent.
    pub outputs: Vec<Option<Value>>,
    pub state: Option<Value>,
}

/// A user-supplied evaluation function for Custom nodes.
#[derive(Clone)]
pub struct CustomFn(Arc<dyn Fn(CustomInput<'_>) -> Result<CustomOutput, String> + Send + Sync>);

impl CustomFn {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(CustomInput<'_>) -> Result<CustomOutput, String> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn call(&self, input: CustomInput<'_>) -> Result<CustomOutput, String> {
        (self.0)(input)
    }
}

macro_rules! opaque_debug {
    ($($name:ident),*) => {
        $(
            impl fmt::Debug for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, concat!(stringify!($name), "(..)"))
                }
            }
        )*
    };
}

opaque_debug!(TransformFn, EffectFn, CustomFn);

/// A function attached to a node's configuration.
#[derive(Debug, Clone)]
pub enum NodeFunction {
    Transform(TransformFn),
    Effect(EffectFn),
    Custom(CustomFn),
}

/// Named functions that external template descriptions can refer to.
#[derive(Debug, Clone, Default)]
pub struct FunctionTable {
    functions: AHashMap<String, NodeFunction>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// A table preloaded with a handful of general-purpose functions.
    pub fn with_standard_functions() -> Self {
        let mut table = Self::new();
        table
            .register_transform("identity", |v| v.clone())
            .register_transform("negate", |v| match v {
                Value::Number(n) => Value::Number(-n),
                other => other.clone(),
            })
            .register_transform("increment", |v| match v {
                Value::Number(n) => Value::Number(n + 1.0),
                other => other.clone(),
            })
            .register_transform("double", |v| match v {
                Value::Number(n) => Value::Number(n * 2.0),
                other => other.clone(),
            })
            .register_transform("not", |v| match v {
                Value::Bool(b) => Value::Bool(!b),
                other => other.clone(),
            })
            .register_transform("to_string", |v| match v {
                Value::String(_) => v.clone(),
                other => Value::String(other.to_string()),
            })
            .register_effect("log", |v| {
                log::info!("effect output: {}", v);
                Ok(())
            });
        table
    }

    pub fn register_transform<F>(&mut self, name: &str, f: F) -> &mut Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        self.insert(name, NodeFunction::Transform(TransformFn::new(f)))
    }

    pub fn register_effect<F>(&mut self, name: &str, f: F) -> &mut Self
    where
        F: Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    {
        self.insert(name, NodeFunction::Effect(EffectFn::new(f)))
    }

    pub fn register_custom(&mut self, name: &str, f: CustomFn) -> &mut Self {
        self.insert(name, NodeFunction::Custom(f))
    }

    pub fn insert(&mut self, name: &str, function: NodeFunction) -> &mut Self {
        self.functions.insert(name.to_string(), function);
        self
    }

    pub fn get(&self, name: &str) -> Option<&NodeFunction> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }
}
