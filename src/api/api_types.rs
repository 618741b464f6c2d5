//! Request payloads and response envelopes for the backend API, plus the
//! lenient deserializers shared by the domain types.
//!
//! The backend is loose about scalar types: ids and flags arrive as numbers
//! or strings, booleans as `0/1`, and some text columns as numbers.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::types::{Fecha, Usuario};

// ============================================================================
// Response envelopes
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiLoginResponse {
  pub token: String,
  pub usuario: Usuario,
}

#[derive(Debug, Deserialize)]
pub struct ApiValidateResponse {
  pub usuario: Usuario,
}

#[derive(Debug, Deserialize)]
pub struct ApiBatchFechasResponse {
  #[serde(default)]
  pub fechas_creadas: Vec<Fecha>,
}

// ============================================================================
// Request bodies
// ============================================================================

#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
  pub correo: &'a str,
  #[serde(rename = "contraseña")]
  pub password: &'a str,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AlmacenInput {
  pub nombre: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub descripcion: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SubalmacenInput {
  pub nombre: String,
  pub almacen_id: u64,
  pub refrigerio: String,
  pub jornada: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FechaInput {
  pub fecha: String,
  pub subalmacen_id: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FechaBatchInput {
  pub fechas: Vec<String>,
  pub subalmacen_id: u64,
}

/// Full edit of an attendance record. `None` hours go out as `null` and
/// clear the stored time; an empty justification clears it too.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct AttendanceUpdate {
  pub hora_entrada: Option<String>,
  pub hora_salida: Option<String>,
  pub justificacion: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RotacionInput {
  pub trabajador_id: u64,
  pub subalmacen_id: u64,
  pub fecha: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TrabajadorInput {
  pub nombre: String,
  pub dni: String,
  pub subalmacen_id: u64,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub coordinador_id: Option<u64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub horas_objetivo: Option<f64>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UsuarioInput {
  pub nombre: String,
  pub correo: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub password: Option<String>,
  pub rol_id: u64,
  pub activo: u8,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AsignarAlmacenesInput {
  pub usuario_id: u64,
  pub almacenes: Vec<u64>,
}

#[derive(Debug, Serialize)]
pub struct ActivarInput {
  pub activo: bool,
}

// ============================================================================
// Lenient deserializers
// ============================================================================

/// Accept `12`, `"12"` or null.
pub fn opt_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
  D: Deserializer<'de>,
{
  let value = Option::<Value>::deserialize(deserializer)?;
  Ok(value.and_then(|v| match v {
    Value::Number(n) => n.as_u64(),
    Value::String(s) => s.trim().parse().ok(),
    _ => None,
  }))
}

/// Like `opt_u64` but required.
pub fn u64_lenient<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
  D: Deserializer<'de>,
{
  opt_u64(deserializer)?.ok_or_else(|| serde::de::Error::custom("expected numeric id"))
}

/// Accept strings, numbers or null; empty strings become `None`.
pub fn opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
  D: Deserializer<'de>,
{
  let value = Option::<Value>::deserialize(deserializer)?;
  Ok(value.and_then(|v| match v {
    Value::String(s) if s.trim().is_empty() => None,
    Value::String(s) => Some(s),
    Value::Number(n) => Some(n.to_string()),
    Value::Bool(b) => Some(b.to_string()),
    _ => None,
  }))
}

/// Accept `true/false`, `1/0` or `"1"/"0"`; null means false.
pub fn bool_lenient<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
  D: Deserializer<'de>,
{
  let value = Option::<Value>::deserialize(deserializer)?;
  Ok(match value {
    Some(Value::Bool(b)) => b,
    Some(Value::Number(n)) => n.as_i64().unwrap_or(0) != 0,
    Some(Value::String(s)) => matches!(s.trim(), "1" | "true"),
    _ => false,
  })
}

/// Accept a number or numeric string.
pub fn opt_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
  D: Deserializer<'de>,
{
  let value = Option::<Value>::deserialize(deserializer)?;
  Ok(value.and_then(|v| match v {
    Value::Number(n) => n.as_f64(),
    Value::String(s) => s.trim().parse().ok(),
    _ => None,
  }))
}
