#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;

use anyhow::Result;
use xshell::{cmd, Shell};

const ANAMORPH_PATH: &str = env!("CARGO_BIN_EXE_anamorph");

#[test]
fn encrypt_decrypt_and_recover() -> Result<()> {
    let sh = Shell::new()?;
    let dir = sh.create_temp_dir()?;
    let keys = dir.path().join("keys");

    // The dictator's key pair and the shared scalar are generated.
    cmd!(sh, "{ANAMORPH_PATH} keygen {keys}").run()?;
    let dictator = keys.join("dictator.json");
    let public_key = keys.join("dictator.pub.json");
    let shared = keys.join("shared.json");

    // The sender writes a cover message.
    let message = dir.path().join("message.json");
    fs::write(&message, r#"{"sub":"alice"}"#)?;

    // The sender encrypts the message for the dictator, carrying the covert value 42.
    let token = dir.path().join("token");
    cmd!(
        sh,
        "{ANAMORPH_PATH} encrypt --recipient {public_key} --shared {shared} --covert 42 {message} {token}"
    )
    .run()?;
    assert_eq!(4, fs::read_to_string(&token)?.trim().split('.').count());

    // The dictator decrypts the cover message.
    let plaintext = cmd!(sh, "{ANAMORPH_PATH} decrypt --private-key {dictator} {token}").read()?;
    assert_eq!(r#"{"sub":"alice"}"#, plaintext);

    // Alice recovers the covert value with each strategy.
    for strategy in ["linear", "parallel", "baby-steps"] {
        let covert = cmd!(
            sh,
            "{ANAMORPH_PATH} recover --shared {shared} --max 100 --strategy {strategy} {token}"
        )
        .read()?;
        assert_eq!("42", covert);
    }

    Ok(())
}

#[test]
fn secret_key_files_are_private() -> Result<()> {
    let sh = Shell::new()?;
    let dir = sh.create_temp_dir()?;
    let keys = dir.path().join("keys");
    cmd!(sh, "{ANAMORPH_PATH} keygen {keys}").run()?;

    for secret in ["dictator.json", "shared.json"] {
        let mode = fs::metadata(keys.join(secret))?.permissions().mode();
        assert_eq!(0o600, mode & 0o777, "{secret} should be readable only by its owner");
    }

    // Regenerating keys over existing files keeps them private.
    fs::set_permissions(keys.join("shared.json"), fs::Permissions::from_mode(0o644))?;
    cmd!(sh, "{ANAMORPH_PATH} keygen {keys}").run()?;
    let mode = fs::metadata(keys.join("shared.json"))?.permissions().mode();
    assert_eq!(0o600, mode & 0o777);

    Ok(())
}

#[test]
fn json_output() -> Result<()> {
    let sh = Shell::new()?;
    let dir = sh.create_temp_dir()?;
    let keys = dir.path().join("keys");
    cmd!(sh, "{ANAMORPH_PATH} keygen {keys}").run()?;
    let dictator = keys.join("dictator.json");
    let public_key = keys.join("dictator.pub.json");
    let shared = keys.join("shared.json");

    let output = cmd!(
        sh,
        "{ANAMORPH_PATH} --json encrypt --recipient {public_key} --shared {shared} --covert 7 -"
    )
    .stdin("cover")
    .read()?;
    let output: serde_json::Value = serde_json::from_str(&output)?;
    let token = output["token"].as_str().expect("token should be a string").to_owned();

    let output = cmd!(sh, "{ANAMORPH_PATH} --json decrypt --private-key {dictator} -")
        .stdin(&token)
        .read()?;
    let output: serde_json::Value = serde_json::from_str(&output)?;
    assert_eq!("cover", output["plaintext"]);

    let output = cmd!(sh, "{ANAMORPH_PATH} --json recover --shared {shared} -").stdin(&token).read()?;
    let output: serde_json::Value = serde_json::from_str(&output)?;
    assert_eq!(7, output["covert"]);
    assert_eq!(64, output["fingerprint"].as_str().expect("fingerprint should be a string").len());

    Ok(())
}

#[test]
fn structured_errors() -> Result<()> {
    let sh = Shell::new()?;
    let dir = sh.create_temp_dir()?;
    let keys = dir.path().join("keys");
    cmd!(sh, "{ANAMORPH_PATH} keygen {keys}").run()?;
    let public_key = keys.join("dictator.pub.json");
    let shared = keys.join("shared.json");

    let token = cmd!(
        sh,
        "{ANAMORPH_PATH} encrypt --recipient {public_key} --shared {shared} --covert 500 -"
    )
    .stdin("cover")
    .read()?;

    // The covert value is past the search bound.
    let output = cmd!(sh, "{ANAMORPH_PATH} --json recover --shared {shared} --max 100 -")
        .stdin(&token)
        .ignore_status()
        .output()?;
    assert!(!output.status.success());
    let error: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!("covert_value_not_found", error["error"]);

    // The bound can come from the environment.
    let output = cmd!(sh, "{ANAMORPH_PATH} recover --shared {shared} -")
        .env("ANAMORPH_MAX_SEARCH", "499")
        .stdin(&token)
        .ignore_status()
        .output()?;
    assert!(!output.status.success());
    let covert = cmd!(sh, "{ANAMORPH_PATH} recover --shared {shared} -")
        .env("ANAMORPH_MAX_SEARCH", "500")
        .stdin(&token)
        .read()?;
    assert_eq!("500", covert);

    // A token is not a key file.
    let token_path = dir.path().join("token");
    fs::write(&token_path, &token)?;
    let output = cmd!(sh, "{ANAMORPH_PATH} --json decrypt --private-key {token_path} {token_path}")
        .ignore_status()
        .output()?;
    assert!(!output.status.success());
    let error: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!("invalid_key_file", error["error"]);

    Ok(())
}
