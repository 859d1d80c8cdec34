use super::ModelTemplate;
use crate::error::TemplateConversionError;

/// A trait for external graph formats that can be converted into a `ModelTemplate`.
///
/// The runtime never reads editor files itself. Implement this trait on the
/// structs of your own format to hand the runtime a template.
///
/// # Example
///
/// ```rust,no_run
/// use nagare::prelude::*;
///
/// struct EditorGraph { fields: Vec<String> }
///
/// impl IntoTemplate for EditorGraph {
///     fn into_template(self) -> std::result::Result<ModelTemplate, TemplateConversionError> {
///         let nodes = vec![
///             NodeTemplate::input("in", self.fields.clone()),
///             NodeTemplate::output("out", self.fields.clone()),
///         ];
///         let edges = self
///             .fields
///             .iter()
///             .map(|f| EdgeTemplate::new("in", f.as_str(), "out", f.as_str()))
///             .collect();
///         Ok(ModelTemplate::new(nodes, edges, IoInterface::new(self.fields.clone(), self.fields)))
///     }
/// }
/// ```
pub trait IntoTemplate {
    /// Consumes the object and converts it into a runtime template.
    fn into_template(self) -> Result<ModelTemplate, TemplateConversionError>;
}
