use std::{fmt, path::PathBuf};

/// The two entry modes: a path argument selects file mode, anything else
/// falls back to the single-prompt mode. No subcommands, no flags.
#[derive(Debug, Clone)]
pub enum Mode {
    File(PathBuf),
    Prompt,
}

#[derive(Debug, Clone)]
pub enum ArgsError {
    TooManyArguments,
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooManyArguments => write!(f, "expected at most one argument: a source file path"),
        }
    }
}

impl Mode {
    pub fn from_args(mut args: impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        args.next(); // program name
        let path = args.next();
        if args.next().is_some() {
            return Err(ArgsError::TooManyArguments);
        }
        match path {
            Some(path) => Ok(Mode::File(PathBuf::from(path))),
            None => Ok(Mode::Prompt),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: &[&str]) -> impl Iterator<Item = String> {
        v.iter().map(|s| s.to_string()).collect::<Vec<_>>().into_iter()
    }

    #[test]
    fn no_arguments_is_prompt_mode() {
        assert!(matches!(Mode::from_args(args(&["vela"])).unwrap(), Mode::Prompt));
    }

    #[test]
    fn one_argument_is_file_mode() {
        match Mode::from_args(args(&["vela", "script.vl"])).unwrap() {
            Mode::File(path) => assert_eq!(path, PathBuf::from("script.vl")),
            Mode::Prompt => panic!("expected file mode"),
        }
    }

    #[test]
    fn extra_arguments_are_rejected() {
        assert!(Mode::from_args(args(&["vela", "a.vl", "b.vl"])).is_err());
    }
}
