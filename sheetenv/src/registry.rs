//! Command registry: the fixed set of command names, their parameter
//! contracts and their parsers.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::core::command::{self, Command};
use crate::core::error::EnvError;
use crate::core::types::{Action, Parameters};

pub type ParseFn = fn(&Parameters) -> Result<Command, EnvError>;

/// Names that appear in command listings of other tools but are not implemented.
/// They are rejected like any other unknown command.
pub const UNIMPLEMENTED_COMMANDS: [&str; 5] = [
    "copy_range",
    "paste_range",
    "sort_range",
    "filter_range",
    "create_chart",
];

/// Declared contract of a single command.
#[derive(Debug, Clone, Serialize)]
pub struct CommandSpec {
    pub name: &'static str,
    pub required: &'static [&'static str],
    pub optional: &'static [&'static str],
    pub description: &'static str,
    #[serde(skip)]
    pub parse: ParseFn,
}

#[derive(Debug, Clone)]
pub struct CommandRegistry {
    commands: BTreeMap<&'static str, CommandSpec>,
}

impl CommandRegistry {
    /// Every command the environment supports.
    pub fn standard() -> Self {
        let specs = [
            spec("create_sheet", &[], &[], "Report the live document's current sheet", command::parse_create_sheet),
            spec("open_file", &["file_path"], &[], "Replace the active document with a file", command::parse_open_file),
            spec("save_file", &["file_path"], &[], "Save the document in the native format", command::parse_save_file),
            spec("set_cell", &["cell"], &["sheet", "value"], "Write one cell value", command::parse_set_cell),
            spec("get_cell", &["cell"], &["sheet"], "Read one cell value", command::parse_get_cell),
            spec("set_range", &["range", "values"], &["sheet"], "Write a 2-D block from the range's top-left cell", command::parse_set_range),
            spec("get_range", &["range"], &["sheet"], "Read a 2-D block of values", command::parse_get_range),
            spec("set_formula", &["cell", "formula"], &["sheet"], "Write a formula into a cell", command::parse_set_formula),
            spec("get_formula", &["cell"], &["sheet"], "Read a cell's formula", command::parse_get_formula),
            spec("add_sheet", &[], &["name"], "Append a sheet", command::parse_add_sheet),
            spec("delete_sheet", &["name"], &[], "Remove a sheet", command::parse_delete_sheet),
            spec("rename_sheet", &["old_name", "new_name"], &[], "Rename a sheet", command::parse_rename_sheet),
            spec("format_cell", &["cell"], &["sheet", "format_options"], "Set bold, italic or colour on a cell", command::parse_format_cell),
            spec("export_pdf", &["file_path"], &[], "Render the current sheet to PDF", command::parse_export_pdf),
            spec("export_csv", &["file_path"], &["sheet"], "Write one sheet as CSV", command::parse_export_csv),
        ];
        Self {
            commands: specs.into_iter().map(|s| (s.name, s)).collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&CommandSpec> {
        self.commands.get(name)
    }

    /// Route an action to its parser. Unknown names fail with
    /// [`EnvError::UnsupportedCommand`].
    pub fn parse(&self, action: &Action) -> Result<Command, EnvError> {
        let spec = self
            .get(&action.command)
            .ok_or_else(|| EnvError::UnsupportedCommand(action.command.clone()))?;
        (spec.parse)(&action.parameters)
    }

    /// Specs in name order.
    pub fn specs(&self) -> impl Iterator<Item = &CommandSpec> {
        self.commands.values()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.commands.keys().copied().collect()
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

fn spec(
    name: &'static str,
    required: &'static [&'static str],
    optional: &'static [&'static str],
    description: &'static str,
    parse: ParseFn,
) -> CommandSpec {
    CommandSpec {
        name,
        required,
        optional,
        description,
        parse,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_holds_the_fixed_command_set() {
        let registry = CommandRegistry::standard();
        assert_eq!(registry.names().len(), 15);
        for name in ["create_sheet", "set_cell", "export_csv", "rename_sheet"] {
            assert!(registry.get(name).is_some(), "{name} should be registered");
        }
    }

    #[test]
    fn unimplemented_names_are_unsupported() {
        let registry = CommandRegistry::standard();
        for name in UNIMPLEMENTED_COMMANDS {
            let err = registry.parse(&Action::new(name)).expect_err("unsupported");
            assert_eq!(err, EnvError::UnsupportedCommand(name.to_string()));
        }
    }

    #[test]
    fn every_required_parameter_is_enforced_by_its_parser() {
        let registry = CommandRegistry::standard();
        for spec in registry.specs() {
            if spec.required.is_empty() {
                assert!(registry.parse(&Action::new(spec.name)).is_ok(), "{}", spec.name);
            } else {
                let err = registry.parse(&Action::new(spec.name)).expect_err(spec.name);
                assert!(matches!(err, EnvError::MissingParameter(_)), "{}", spec.name);
            }
        }
    }

    #[test]
    fn parse_returns_the_typed_command() {
        let registry = CommandRegistry::standard();
        let cmd = registry
            .parse(&Action::new("get_range").with("range", "A1:C2"))
            .expect("parse");
        assert_eq!(cmd.name(), "get_range");
    }
}
