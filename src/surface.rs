use crate::model::WizardStep;
use anyhow::{Context, Result};
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Input, Select};
use std::io::ErrorKind;

pub type Validator<'a> = &'a dyn Fn(&str) -> std::result::Result<(), String>;

pub trait InteractionSurface {
    fn show_placeholder(&mut self, step: &WizardStep);
    fn hide_placeholder(&mut self);
    fn show_choice(&mut self, step: &WizardStep) -> Result<Option<String>>;
    fn show_text_input(
        &mut self,
        step: &WizardStep,
        error: Option<&str>,
        validate: Validator<'_>,
    ) -> Result<Option<String>>;
    fn notify(&mut self, message: &str);
}

pub struct TerminalSurface {
    theme: ColorfulTheme,
}

impl TerminalSurface {
    pub fn new() -> Self {
        Self {
            theme: ColorfulTheme::default(),
        }
    }
}

impl Default for TerminalSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl InteractionSurface for TerminalSurface {
    fn show_placeholder(&mut self, step: &WizardStep) {
        match step.placeholder.as_deref() {
            Some(placeholder) => eprintln!("{} — {placeholder}", step.title),
            None => eprintln!("{}", step.title),
        }
    }

    fn hide_placeholder(&mut self) {}

    fn show_choice(&mut self, step: &WizardStep) -> Result<Option<String>> {
        let selection = Select::with_theme(&self.theme)
            .with_prompt(step.numbered_title())
            .items(&step.choices)
            .default(0)
            .interact_opt();

        match selection {
            Ok(Some(index)) => {
                let choice = step
                    .choices
                    .get(index)
                    .with_context(|| format!("choice index {index} out of range"))?;
                Ok(Some(choice.clone()))
            }
            Ok(None) => Ok(None),
            Err(dialoguer::Error::IO(error)) if error.kind() == ErrorKind::Interrupted => Ok(None),
            Err(error) => Err(error).context("choice prompt failed"),
        }
    }

    fn show_text_input(
        &mut self,
        step: &WizardStep,
        error: Option<&str>,
        validate: Validator<'_>,
    ) -> Result<Option<String>> {
        let prompt = match (error, step.placeholder.as_deref()) {
            (Some(message), _) => format!("{} — {message}", step.numbered_title()),
            (None, Some(placeholder)) => format!("{} — {placeholder}", step.numbered_title()),
            (None, None) => step.numbered_title(),
        };
        let input = Input::<String>::with_theme(&self.theme)
            .with_prompt(prompt)
            .allow_empty(true)
            .validate_with(|value: &String| validate(value));

        match input.interact_text() {
            Ok(value) => Ok(Some(value)),
            Err(dialoguer::Error::IO(error)) if error.kind() == ErrorKind::Interrupted => Ok(None),
            Err(error) => Err(error).context("text prompt failed"),
        }
    }

    fn notify(&mut self, message: &str) {
        eprintln!("{message}");
    }
}
