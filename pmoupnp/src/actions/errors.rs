use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    #[error("Argument '{0}' already exists in action")]
    ArgumentAlreadyExists(String),

    /// L'argument `<retval/>` doit être le premier argument de sortie
    #[error("Return value argument '{0}' must be the first out argument")]
    ReturnValueNotFirst(String),

    #[error("Input argument '{0}' declared after an output argument")]
    InputAfterOutput(String),

    #[error("'{0}' is already attached")]
    AlreadyAttached(String),
}
