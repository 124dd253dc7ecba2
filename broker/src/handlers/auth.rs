//! `auth`: verifies an RS256 JWT against the named client's public key.

use std::path::PathBuf;

use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use crate::errors::BrokerError;
use crate::instruction::{Instruction, InstructionType, StateChanges};
use crate::jsonrpc::Answer;

use super::HandlerContext;

#[derive(Deserialize)]
struct AuthParams {
    key: String,
}

/// `jsonwebtoken` validates exp/nbf by default; the broker's tokens carry
/// no standard claims, only an opaque random payload (per the original's
/// `cryptosupport.Check`), so the claim checks are disabled here. Signature
/// verification itself stays on.
fn no_claims_validation() -> Validation {
    let mut validation = Validation::new(Algorithm::RS256);
    validation.required_spec_claims.clear();
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation
}

fn load_public_key(key_dir: &PathBuf, name: &str) -> Result<DecodingKey, BrokerError> {
    let path = key_dir.join(format!("{name}.pub"));
    let pem = std::fs::read(&path)
        .map_err(|e| BrokerError::KeyLoad(format!("{}: {}", path.display(), e)))?;
    DecodingKey::from_rsa_pem(&pem).map_err(|e| BrokerError::KeyLoad(e.to_string()))
}

pub fn pre(ctx: &HandlerContext, ins: &Instruction) -> Instruction {
    let mut out = Instruction::new(InstructionType::Auth, ins.cid);
    let Some(cmd) = &ins.command else {
        return out.with_answer(Answer::from_broker_error(
            0,
            &BrokerError::Internal("auth without command".into()),
        ));
    };

    let result = verify(ctx, &cmd.params.json, &cmd.params.data);
    match result {
        Ok(()) => {
            out = out.with_state_changes(StateChanges::Auth(true));
            out.with_answer(Answer::ok(cmd.id, "{\"auth\":true}"))
        }
        Err(err) => {
            out = out.with_state_changes(StateChanges::Auth(false));
            out.with_answer(Answer::from_broker_error(cmd.id, &err))
        }
    }
}

fn verify(ctx: &HandlerContext, json: &str, token: &str) -> Result<(), BrokerError> {
    let params: AuthParams = serde_json::from_str(json)
        .map_err(|e| BrokerError::ParamsFormat(e.to_string()))?;

    if token.split('.').count() != 3 {
        return Err(BrokerError::AuthFailed(
            "token must have 3 parts".to_string(),
        ));
    }

    let key = load_public_key(&ctx.key_dir, &params.key)?;
    let validation = no_claims_validation();

    jsonwebtoken::decode::<serde_json::Value>(token, &key, &validation)
        .map(|_| ())
        .map_err(|e| BrokerError::AuthFailed(e.to_string()))
}
