use crate::typing as local;

/// The training logic a node runs when the server hands it work.
///
/// Implementations are called from the transport's task, so they must be
/// shareable across threads.
pub trait Client: Send + Sync {
    /// Return the current local model parameters
    fn get_parameters(&self, ins: local::GetParametersIns) -> local::GetParametersRes;

    fn get_properties(&self, ins: local::GetPropertiesIns) -> local::GetPropertiesRes;

    /// Refine the provided weights using the locally held dataset.
    ///
    /// The instructions carry the global model parameters and the
    /// configuration values for this round of local training.
    fn fit(&self, ins: local::FitIns) -> local::FitRes;

    /// Evaluate the provided weights using the locally held dataset.
    fn evaluate(&self, ins: local::EvaluateIns) -> local::EvaluateRes;
}
