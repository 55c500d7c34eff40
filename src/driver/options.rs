//! Command line argument handling

use std::path::PathBuf;

use structopt::StructOpt;

use crate::eval::settings::SettingsArgs;

/// Rebind - evaluate homoiconic source against a managed heap
#[derive(StructOpt, Debug, Clone, Default)]
#[structopt(name = "rebind")]
pub struct RebindOptions {
    /// Expression to evaluate after any files
    #[structopt(short = "e", long = "eval")]
    pub evaluate: Option<String>,

    /// Print metrics to stderr before exiting
    #[structopt(short = "S", long = "statistics")]
    pub statistics: bool,

    /// Configuration file to use instead of searching for rebind.toml
    #[structopt(short = "c", long = "config", parse(from_os_str))]
    pub config: Option<PathBuf>,

    /// Explain what would be executed and exit
    #[structopt(long = "explain")]
    pub explain: bool,

    #[structopt(flatten)]
    pub settings: SettingsArgs,

    /// Source files to evaluate, in order
    #[structopt(name = "FILES", parse(from_os_str))]
    pub files: Vec<PathBuf>,
}

impl RebindOptions {
    pub fn statistics(&self) -> bool {
        self.statistics
    }

    pub fn explain(&self) -> bool {
        self.explain
    }

    /// The sources to evaluate: files in order then any `-e`
    /// expression
    pub fn inputs(&self) -> Vec<Input> {
        let mut inputs: Vec<Input> = self.files.iter().cloned().map(Input::File).collect();
        if let Some(text) = &self.evaluate {
            inputs.push(Input::Cli(text.clone()));
        }
        inputs
    }

    /// Describe the inputs and settings without running anything
    pub fn explanation(&self) -> String {
        let mut lines = vec![];
        for input in self.inputs() {
            lines.push(format!("evaluate {}", input));
        }
        if lines.is_empty() {
            lines.push("nothing to evaluate".to_string());
        }
        match &self.config {
            Some(path) => lines.push(format!("config from {}", path.display())),
            None => lines.push("config from rebind.toml search".to_string()),
        }
        lines.join("\n")
    }
}

/// A source of program text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    File(PathBuf),
    Cli(String),
}

impl std::fmt::Display for Input {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Input::File(path) => write!(f, "{}", path.display()),
            Input::Cli(_) => write!(f, "[cli]"),
        }
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    pub fn test_inputs_in_order() {
        let opts = RebindOptions::from_iter(vec!["rebind", "-e", "1 + 2", "a.r", "b.r"]);
        assert_eq!(
            opts.inputs(),
            vec![
                Input::File("a.r".into()),
                Input::File("b.r".into()),
                Input::Cli("1 + 2".to_string())
            ]
        );
    }

    #[test]
    pub fn test_settings_flags_flatten() {
        let opts = RebindOptions::from_iter(vec!["rebind", "-S", "--max-depth", "99"]);
        assert!(opts.statistics());
        assert_eq!(opts.settings.max_depth, Some(99));
    }
}
