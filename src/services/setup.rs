use crate::core::error::BookError;
use crate::services::credentials::{CredentialGate, CredentialKind};
use anyhow::Result;
use inquire::{Password, PasswordDisplayMode};

fn signup_url(kind: CredentialKind) -> &'static str {
    match kind {
        CredentialKind::OpenAI => "https://platform.openai.com/api-keys",
        CredentialKind::Replicate => "https://replicate.com/account/api-tokens",
        CredentialKind::Fal => "https://fal.ai/dashboard/keys",
    }
}

/// Prompts for every credential in `required` that is missing or invalid.
///
/// A rejected value is reported and asked for again. Nothing touches the
/// network here; the keys are only checked for their expected shape.
pub async fn run_setup(gate: &CredentialGate, required: &[CredentialKind]) -> Result<()> {
    let missing = gate.missing(required).await?;
    if missing.is_empty() {
        return Ok(());
    }

    println!("\nStep 1: Enter Your API Keys");
    println!("Your keys are stored only on this machine and used to call the providers.");

    for kind in missing {
        println!("Get one at {}", signup_url(kind));
        loop {
            let value = Password::new(&format!("{}:", kind.label()))
                .with_display_mode(PasswordDisplayMode::Masked)
                .with_help_message(&format!("Looks like {}", kind.placeholder()))
                .without_confirmation()
                .prompt()?;

            match gate.save(kind, &value).await {
                Ok(()) => break,
                Err(BookError::Credential(msg)) => eprintln!("✗ {}", msg),
                Err(e) => return Err(e.into()),
            }
        }
    }

    println!("Keys saved.");
    Ok(())
}
