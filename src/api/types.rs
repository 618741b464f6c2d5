use serde::{Deserialize, Serialize};

use super::api_types::{bool_lenient, opt_f64, opt_string, opt_u64, u64_lenient};

/// Warehouse
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Almacen {
  #[serde(deserialize_with = "u64_lenient")]
  pub id: u64,
  pub nombre: String,
  #[serde(default, deserialize_with = "opt_string")]
  pub descripcion: Option<String>,
}

/// Sub-warehouse with its own roster and schedule
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Subalmacen {
  #[serde(deserialize_with = "u64_lenient")]
  pub id: u64,
  pub nombre: String,
  #[serde(default, deserialize_with = "opt_u64")]
  pub almacen_id: Option<u64>,
  #[serde(default, deserialize_with = "opt_string")]
  pub almacen_nombre: Option<String>,
  /// Break length as entered by the backend (free text or minutes)
  #[serde(default, deserialize_with = "opt_string")]
  pub refrigerio: Option<String>,
  /// Shift length
  #[serde(default, deserialize_with = "opt_string")]
  pub jornada: Option<String>,
}

/// A scheduled date for a sub-warehouse
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Fecha {
  #[serde(deserialize_with = "u64_lenient")]
  pub id: u64,
  pub fecha: String,
  #[serde(default, deserialize_with = "opt_u64")]
  pub subalmacen_id: Option<u64>,
}

impl Fecha {
  /// Calendar day (`YYYY-MM-DD`), dropping any time component.
  pub fn day(&self) -> &str {
    self.fecha.get(..10).unwrap_or(&self.fecha)
  }
}

/// One worker's check-in/out for one (sub-warehouse, date)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttendanceRecord {
  #[serde(deserialize_with = "u64_lenient")]
  pub id: u64,
  #[serde(default, deserialize_with = "opt_u64")]
  pub trabajador_id: Option<u64>,
  #[serde(default)]
  pub trabajador_nombre: String,
  #[serde(default, deserialize_with = "opt_string")]
  pub trabajador_dni: Option<String>,
  #[serde(default, deserialize_with = "opt_string")]
  pub almacen_nombre: Option<String>,
  #[serde(default, deserialize_with = "opt_string")]
  pub subalmacen_nombre: Option<String>,
  #[serde(default, deserialize_with = "opt_u64")]
  pub subalmacen_id: Option<u64>,
  #[serde(default, deserialize_with = "opt_string")]
  pub fecha: Option<String>,
  #[serde(default, deserialize_with = "opt_string")]
  pub hora_entrada: Option<String>,
  #[serde(default, deserialize_with = "opt_string")]
  pub hora_salida: Option<String>,
  #[serde(default, deserialize_with = "opt_string")]
  pub justificacion: Option<String>,
  #[serde(default, deserialize_with = "opt_string")]
  pub registrado_por_nombre: Option<String>,
}

/// Attendance state derived from entry/exit times
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendanceStatus {
  /// Entry and exit recorded
  Complete,
  /// Checked in, no exit yet
  InProgress,
  /// No entry, but justified
  Justified,
  Absent,
}

impl AttendanceRecord {
  pub fn status(&self) -> AttendanceStatus {
    match (&self.hora_entrada, &self.hora_salida, &self.justificacion) {
      (Some(_), Some(_), _) => AttendanceStatus::Complete,
      (Some(_), None, _) => AttendanceStatus::InProgress,
      (None, _, Some(_)) => AttendanceStatus::Justified,
      (None, _, None) => AttendanceStatus::Absent,
    }
  }
}

/// Worker
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trabajador {
  #[serde(deserialize_with = "u64_lenient")]
  pub id: u64,
  pub nombre: String,
  #[serde(default, deserialize_with = "opt_string")]
  pub dni: Option<String>,
  #[serde(default, deserialize_with = "bool_lenient")]
  pub activo: bool,
  #[serde(default, deserialize_with = "opt_u64")]
  pub subalmacen_id: Option<u64>,
  #[serde(default, deserialize_with = "opt_u64")]
  pub coordinador_id: Option<u64>,
  #[serde(default, deserialize_with = "opt_string")]
  pub almacen: Option<String>,
  #[serde(default, deserialize_with = "opt_string")]
  pub subalmacen: Option<String>,
  #[serde(default, deserialize_with = "opt_string")]
  pub coordinador: Option<String>,
  #[serde(default, deserialize_with = "opt_f64")]
  pub horas_objetivo: Option<f64>,
}

/// Staff roles known to the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rol {
  Rrhh,
  Administracion,
  Coordinador,
}

impl Rol {
  pub fn id(self) -> u64 {
    match self {
      Rol::Rrhh => 1,
      Rol::Administracion => 2,
      Rol::Coordinador => 3,
    }
  }

  pub fn from_id(id: u64) -> Option<Self> {
    match id {
      1 => Some(Rol::Rrhh),
      2 => Some(Rol::Administracion),
      3 => Some(Rol::Coordinador),
      _ => None,
    }
  }

  pub fn from_name(name: &str) -> Option<Self> {
    match name.trim().to_uppercase().as_str() {
      "RRHH" => Some(Rol::Rrhh),
      "ADMINISTRACION" | "ADMINISTRACIÓN" => Some(Rol::Administracion),
      "COORDINADOR" => Some(Rol::Coordinador),
      // Some endpoints send the id in the name column
      other => other.parse().ok().and_then(Rol::from_id),
    }
  }

  pub fn label(self) -> &'static str {
    match self {
      Rol::Rrhh => "RRHH",
      Rol::Administracion => "ADMINISTRACION",
      Rol::Coordinador => "COORDINADOR",
    }
  }
}

/// Staff user (RRHH, administration, coordinator)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Usuario {
  #[serde(default, deserialize_with = "opt_u64")]
  pub id: Option<u64>,
  #[serde(default)]
  pub nombre: String,
  #[serde(default, deserialize_with = "opt_string")]
  pub correo: Option<String>,
  #[serde(default, deserialize_with = "opt_u64")]
  pub rol_id: Option<u64>,
  #[serde(default, deserialize_with = "opt_string")]
  pub nombre_rol: Option<String>,
  #[serde(default, deserialize_with = "bool_lenient")]
  pub activo: bool,
}

impl Usuario {
  pub fn rol(&self) -> Option<Rol> {
    self
      .nombre_rol
      .as_deref()
      .and_then(Rol::from_name)
      .or_else(|| self.rol_id.and_then(Rol::from_id))
  }

  /// Only RRHH and administration may use this client.
  pub fn can_sign_in(&self) -> bool {
    matches!(self.rol(), Some(Rol::Rrhh | Rol::Administracion))
  }

  pub fn rol_label(&self) -> String {
    match self.rol() {
      Some(rol) => rol.label().to_string(),
      None => self.nombre_rol.clone().unwrap_or_default(),
    }
  }
}

/// Dashboard counters
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DashboardResumen {
  #[serde(default)]
  pub total_almacenes: u64,
  #[serde(default)]
  pub total_subalmacenes: u64,
  #[serde(default)]
  pub total_coordinadores: u64,
  #[serde(default)]
  pub total_trabajadores: u64,
}

/// Overtime ranking row (`/api/dashboard/horas-extras`)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HorasExtra {
  #[serde(default)]
  pub nombre: String,
  #[serde(default, deserialize_with = "opt_f64")]
  pub horas_extra: Option<f64>,
}

/// Workers below their target hours (`/api/dashboard/horas-faltantes`)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HorasFaltantes {
  #[serde(default)]
  pub nombre: String,
  #[serde(default, deserialize_with = "opt_f64")]
  pub horas_asignadas: Option<f64>,
  #[serde(default, deserialize_with = "opt_f64")]
  pub horas_trabajadas: Option<f64>,
}

impl HorasFaltantes {
  pub fn faltantes(&self) -> f64 {
    let asignadas = self.horas_asignadas.unwrap_or(0.0);
    let trabajadas = self.horas_trabajadas.unwrap_or(0.0);
    (asignadas - trabajadas).max(0.0)
  }
}

/// Worker active this week (`/api/dashboard/trabajadores-semana`)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrabajadorSemana {
  #[serde(default)]
  pub nombre: String,
  #[serde(default, deserialize_with = "opt_string")]
  pub almacen: Option<String>,
  #[serde(default, deserialize_with = "opt_string")]
  pub subalmacen: Option<String>,
  #[serde(default, deserialize_with = "bool_lenient")]
  pub activo: bool,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_attendance_record_from_backend_row() {
    let json = r#"{
      "id": 31,
      "trabajador_id": "8",
      "trabajador_nombre": "Luis Quispe",
      "trabajador_dni": 45879632,
      "almacen_nombre": "Central",
      "subalmacen_nombre": "Frío",
      "hora_entrada": "07:58",
      "hora_salida": null,
      "justificacion": "",
      "registrado_por_nombre": "Ana"
    }"#;
    let record: AttendanceRecord = serde_json::from_str(json).unwrap();
    assert_eq!(record.id, 31);
    assert_eq!(record.trabajador_id, Some(8));
    assert_eq!(record.trabajador_dni.as_deref(), Some("45879632"));
    assert_eq!(record.justificacion, None);
    assert_eq!(record.status(), AttendanceStatus::InProgress);
  }

  #[test]
  fn test_attendance_status() {
    let mut record: AttendanceRecord = serde_json::from_str(r#"{"id":1}"#).unwrap();
    assert_eq!(record.status(), AttendanceStatus::Absent);
    record.justificacion = Some("Descanso médico".into());
    assert_eq!(record.status(), AttendanceStatus::Justified);
    record.hora_entrada = Some("08:00".into());
    record.hora_salida = Some("17:00".into());
    assert_eq!(record.status(), AttendanceStatus::Complete);
  }

  #[test]
  fn test_fecha_day_strips_time() {
    let fecha: Fecha =
      serde_json::from_str(r#"{"id":"3","fecha":"2024-05-02T05:00:00.000Z"}"#).unwrap();
    assert_eq!(fecha.day(), "2024-05-02");
  }

  #[test]
  fn test_roles_allowed_to_sign_in() {
    let rrhh: Usuario = serde_json::from_str(r#"{"nombre":"Ana","nombre_rol":"RRHH"}"#).unwrap();
    assert!(rrhh.can_sign_in());

    let admin_by_id: Usuario = serde_json::from_str(r#"{"nombre":"Jo","nombre_rol":2}"#).unwrap();
    assert!(admin_by_id.can_sign_in());

    let coord: Usuario = serde_json::from_str(r#"{"nombre":"Pe","rol_id":"3"}"#).unwrap();
    assert_eq!(coord.rol(), Some(Rol::Coordinador));
    assert!(!coord.can_sign_in());
  }

  #[test]
  fn test_missing_hours_never_negative() {
    let row: HorasFaltantes = serde_json::from_str(
      r#"{"nombre":"Rosa","horas_asignadas":"48","horas_trabajadas":50.5}"#,
    )
    .unwrap();
    assert_eq!(row.faltantes(), 0.0);
  }

  #[test]
  fn test_worker_active_flag_as_number() {
    let t: Trabajador =
      serde_json::from_str(r#"{"id":4,"nombre":"Rosa","activo":0,"horas_objetivo":"48"}"#).unwrap();
    assert!(!t.activo);
    assert_eq!(t.horas_objetivo, Some(48.0));
  }
}
