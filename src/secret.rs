use anyhow::{Context, Result, bail};
use facegate::StorageKey;
use std::io::{self, BufRead, IsTerminal};
use zeroize::Zeroizing;

pub const STORAGE_KEY_ENV: &str = "FACEGATE_STORAGE_KEY";

pub fn read_storage_key() -> Result<StorageKey> {
    //  Environment Variable
    //  FACEGATE_STORAGE_KEY="<base64>" facegate login face.json
    if let Ok(raw) = std::env::var(STORAGE_KEY_ENV) {
        let raw = Zeroizing::new(raw);
        if !raw.trim().is_empty() {
            return parse(&raw);
        }
    }

    //  stdin (Pipeline)
    //  printf "%s" "$KEY" | facegate login face.json
    if !io::stdin().is_terminal() {
        let mut buf = Zeroizing::new(String::new());
        io::stdin().lock().read_line(&mut buf)?;
        if !buf.trim().is_empty() {
            return parse(&buf);
        }
    }

    //  TTY
    if io::stdin().is_terminal() {
        let raw = Zeroizing::new(rpassword::prompt_password("Storage key (base64): ")?);
        if !raw.trim().is_empty() {
            return parse(&raw);
        }
    }

    bail!("No storage key provided (set {STORAGE_KEY_ENV})")
}

fn parse(raw: &str) -> Result<StorageKey> {
    StorageKey::from_base64(raw.trim()).context("invalid storage key")
}
