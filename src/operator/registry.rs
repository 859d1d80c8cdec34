use super::{Operator, OperatorKind};
use crate::error::RegistryError;
use crate::template::NodeTemplate;
use ahash::AHashMap;
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::Arc;

static GLOBAL: OnceCell<OperatorMap> = OnceCell::new();

/// Resolves operator type ids to operator implementations.
///
/// A map is populated once, before any block is constructed, and only read
/// afterwards. Tests should build their own map instead of using [`OperatorMap::global`].
#[derive(Clone, Default)]
pub struct OperatorMap {
    operators: AHashMap<String, Arc<dyn Operator>>,
    order: Vec<String>,
}

impl OperatorMap {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the ten built-in operator kinds.
    pub fn with_builtins() -> Self {
        let mut map = Self::new();
        for kind in OperatorKind::ALL {
            map.insert(Arc::new(*kind));
        }
        map
    }

    /// Adds an operator under its type id. Existing registrations are never replaced.
    pub fn register(&mut self, operator: impl Operator + 'static) -> Result<(), RegistryError> {
        self.register_shared(Arc::new(operator))
    }

    pub fn register_shared(&mut self, operator: Arc<dyn Operator>) -> Result<(), RegistryError> {
        let type_id = operator.operator_type();
        if self.operators.contains_key(type_id) {
            return Err(RegistryError::DuplicateOperatorType(type_id.to_string()));
        }
        log::debug!("registered operator type '{}'", type_id);
        self.insert(operator);
        Ok(())
    }

    /// Registers every operator in order, stopping at the first duplicate.
    pub fn register_all<I>(&mut self, operators: I) -> Result<(), RegistryError>
    where
        I: IntoIterator<Item = Arc<dyn Operator>>,
    {
        operators
            .into_iter()
            .try_for_each(|operator| self.register_shared(operator))
    }

    fn insert(&mut self, operator: Arc<dyn Operator>) {
        let type_id = operator.operator_type().to_string();
        self.order.push(type_id.clone());
        self.operators.insert(type_id, operator);
    }

    pub fn get_operator_from_node(
        &self,
        node: &NodeTemplate,
    ) -> Result<Arc<dyn Operator>, RegistryError> {
        self.get_operator_from_operator_type(&node.operator_type)
    }

    pub fn get_operator_from_operator_type(
        &self,
        operator_type: &str,
    ) -> Result<Arc<dyn Operator>, RegistryError> {
        self.operators
            .get(operator_type)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownOperatorType(operator_type.to_string()))
    }

    pub fn contains(&self, operator_type: &str) -> bool {
        self.operators.contains_key(operator_type)
    }

    /// Registered type ids, in registration order.
    pub fn operator_types(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }

    /// Freezes `map` as the process-wide registry.
    ///
    /// Fails once the global registry exists, whether it was installed or
    /// lazily created by [`OperatorMap::global`].
    pub fn install_global(map: OperatorMap) -> Result<(), RegistryError> {
        GLOBAL
            .set(map)
            .map_err(|_| RegistryError::GlobalAlreadyInitialized)
    }

    /// The process-wide registry, holding the built-ins unless another map was installed first.
    pub fn global() -> &'static OperatorMap {
        GLOBAL.get_or_init(OperatorMap::with_builtins)
    }
}

impl fmt::Debug for OperatorMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatorMap")
            .field("operators", &self.order)
            .finish()
    }
}
