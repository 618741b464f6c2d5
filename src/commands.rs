/// Command palette entries and autocomplete

#[derive(Debug, Clone)]
pub struct Command {
  pub name: &'static str,
  pub aliases: &'static [&'static str],
  pub description: &'static str,
}

pub const COMMANDS: &[Command] = &[
  Command {
    name: "almacenes",
    aliases: &["a", "alm"],
    description: "Almacenes, subalmacenes y fechas",
  },
  Command {
    name: "trabajadores",
    aliases: &["t", "workers"],
    description: "Alta y baja de trabajadores",
  },
  Command {
    name: "coordinadores",
    aliases: &["c", "coord"],
    description: "Coordinadores y sus almacenes",
  },
  Command {
    name: "rrhh",
    aliases: &["h", "usuarios"],
    description: "Usuarios de RRHH",
  },
  Command {
    name: "dashboard",
    aliases: &["d", "dash"],
    description: "Resumen y horas",
  },
  Command {
    name: "logout",
    aliases: &["salir-sesion"],
    description: "Cerrar sesión",
  },
  Command {
    name: "quit",
    aliases: &["q", "exit", "salir"],
    description: "Salir de almacen",
  },
];

/// Lower is better; `None` means no match.
fn rank(cmd: &Command, input: &str) -> Option<u8> {
  if cmd.name == input {
    Some(0)
  } else if cmd.aliases.contains(&input) {
    Some(1)
  } else if cmd.name.starts_with(input) {
    Some(2)
  } else if cmd.aliases.iter().any(|a| a.starts_with(input)) {
    Some(3)
  } else if cmd.name.contains(input) {
    Some(4)
  } else if cmd.aliases.iter().any(|a| a.contains(input)) {
    Some(5)
  } else {
    None
  }
}

/// Suggestions for the palette, best match first
pub fn get_suggestions(input: &str) -> Vec<&'static Command> {
  let input = input.trim().to_lowercase();
  if input.is_empty() {
    return COMMANDS.iter().collect();
  }

  let mut matches: Vec<(&'static Command, u8)> = COMMANDS
    .iter()
    .filter_map(|cmd| rank(cmd, &input).map(|r| (cmd, r)))
    .collect();
  // Stable sort keeps table order among equal ranks
  matches.sort_by_key(|(_, r)| *r);
  matches.into_iter().map(|(cmd, _)| cmd).collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_input_returns_all() {
    assert_eq!(get_suggestions("").len(), COMMANDS.len());
  }

  #[test]
  fn test_exact_match() {
    assert_eq!(get_suggestions("almacenes")[0].name, "almacenes");
  }

  #[test]
  fn test_alias_match() {
    assert_eq!(get_suggestions("t")[0].name, "trabajadores");
    assert_eq!(get_suggestions("salir")[0].name, "quit");
  }

  #[test]
  fn test_prefix_match() {
    assert_eq!(get_suggestions("coo")[0].name, "coordinadores");
  }

  #[test]
  fn test_fuzzy_match() {
    assert_eq!(get_suggestions("cenes")[0].name, "almacenes");
    assert!(get_suggestions("zzz").is_empty());
  }
}
