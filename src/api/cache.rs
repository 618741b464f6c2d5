//! Caching implementations for backend types.

use std::fmt;

use crate::cache::Cacheable;

use super::types::AttendanceRecord;

// ============================================================================
// Cacheable implementations
// ============================================================================

impl Cacheable for AttendanceRecord {
  fn entity_type() -> &'static str {
    "asistencia"
  }
}

// ============================================================================
// Query keys
// ============================================================================

/// Identifies one attendance roster: a sub-warehouse on a given day.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttendanceKey {
  pub subalmacen_id: u64,
  /// `YYYY-MM-DD`
  pub fecha: String,
}

impl AttendanceKey {
  pub fn new(subalmacen_id: u64, fecha: impl Into<String>) -> Self {
    Self {
      subalmacen_id,
      fecha: fecha.into(),
    }
  }

  pub fn cache_key(&self) -> String {
    format!("{}-{}", self.subalmacen_id, self.fecha)
  }
}

impl fmt::Display for AttendanceKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "subalmacén {} · {}", self.subalmacen_id, self.fecha)
  }
}
