/// Outcome of offering a key to a component.
///
/// Views try their components in order and stop at the first one that does
/// not answer `NotHandled`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyResult<T> {
  /// Consumed, nothing for the view to do
  Handled,
  /// Consumed, and the view should act on this event
  Event(T),
  /// Not for this component
  NotHandled,
}
