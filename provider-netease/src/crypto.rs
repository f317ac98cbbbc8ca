//! Request encryption for the two proprietary API modes.
//!
//! - **weapi**: JSON body encrypted twice with AES-128-CBC (a fixed preset
//!   key, then a random per-request secret). The secret is reversed and
//!   wrapped with textbook RSA (no padding) against a fixed 1024-bit modulus.
//! - **eapi**: `"{path}-36cd479b6b5-{json}-36cd479b6b5-{md5}"` encrypted with
//!   AES-128-ECB under a fixed key, upper-hex encoded.
//!
//! All constants are interop details and live only in this module.

use aes::Aes128;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use cbc::cipher::{block_padding::Pkcs7, BlockEncryptMut, KeyInit, KeyIvInit};
use md5::{Digest, Md5};
use num_bigint::BigUint;
use rand::Rng;

use crate::error::{NeteaseError, Result};

const IV: &[u8; 16] = b"0102030405060708";
const PRESET_KEY: &[u8; 16] = b"0CoJUm6Qyw8W8jud";
const EAPI_KEY: &[u8; 16] = b"e82ckenh8dichen8";
const BASE62: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const PUBLIC_EXPONENT: u32 = 0x10001;
const MODULUS_HEX: &str = "e0b509f6259df8642dbc35662901477df22677ec152b5ff68ace615bb7b725152b3ab17a876aea8a5aa76d2e417629ec4ee341f56135fccf695280104e0312ecbda92557c93870114af6c9d05c4f7f0c3685b7a46bee255932575cce10b424d813cfe4875d3e82047b97ddef52741d546b8e289dc6935b3ece0462db0a22b8e7";
const EAPI_SEPARATOR: &str = "-36cd479b6b5-";

/// Form fields of a weapi request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeapiForm {
    pub params: String,
    pub enc_sec_key: String,
}

impl WeapiForm {
    pub fn into_pairs(self) -> Vec<(String, String)> {
        vec![
            ("params".to_string(), self.params),
            ("encSecKey".to_string(), self.enc_sec_key),
        ]
    }
}

/// Encrypt a weapi JSON body with a fresh random secret.
pub fn weapi(text: &str) -> Result<WeapiForm> {
    weapi_with_secret(text, &random_secret())
}

/// Encrypt a weapi JSON body with the given 16-byte secret.
pub fn weapi_with_secret(text: &str, secret: &[u8; 16]) -> Result<WeapiForm> {
    let first = STANDARD.encode(aes_cbc(text.as_bytes(), PRESET_KEY)?);
    let params = STANDARD.encode(aes_cbc(first.as_bytes(), secret)?);
    let enc_sec_key = rsa_no_padding(secret)?;
    Ok(WeapiForm {
        params,
        enc_sec_key,
    })
}

/// Encrypt an eapi body for `path` (the `/api/...` form of the endpoint).
pub fn eapi(path: &str, text: &str) -> Result<String> {
    let message = format!("nobody{}use{}md5forencrypt", path, text);
    let digest = md5_hex(message.as_bytes());
    let data = format!(
        "{path}{sep}{text}{sep}{digest}",
        sep = EAPI_SEPARATOR
    );
    let cipher = ecb::Encryptor::<Aes128>::new_from_slice(EAPI_KEY)
        .map_err(|e| NeteaseError::Crypto(e.to_string()))?;
    let encrypted = cipher.encrypt_padded_vec_mut::<Pkcs7>(data.as_bytes());
    Ok(hex::encode_upper(encrypted))
}

/// Lowercase hex MD5 of `data`.
pub fn md5_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

fn aes_cbc(data: &[u8], key: &[u8; 16]) -> Result<Vec<u8>> {
    let cipher = cbc::Encryptor::<Aes128>::new_from_slices(key, IV)
        .map_err(|e| NeteaseError::Crypto(e.to_string()))?;
    Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(data))
}

fn rsa_no_padding(secret: &[u8; 16]) -> Result<String> {
    let modulus = BigUint::parse_bytes(MODULUS_HEX.as_bytes(), 16)
        .ok_or_else(|| NeteaseError::Crypto("invalid RSA modulus".to_string()))?;
    let mut reversed = *secret;
    reversed.reverse();
    let message = BigUint::from_bytes_be(&reversed);
    let encrypted = message.modpow(&BigUint::from(PUBLIC_EXPONENT), &modulus);
    Ok(format!("{:0>256}", encrypted.to_str_radix(16)))
}

fn random_secret() -> [u8; 16] {
    let mut rng = rand::thread_rng();
    let mut secret = [0u8; 16];
    for byte in secret.iter_mut() {
        *byte = BASE62[rng.gen_range(0..BASE62.len())];
    }
    secret
}

/// Random 16-byte hex device id used as `_ntes_nuid`.
pub fn random_nuid() -> String {
    hex::encode(rand::random::<[u8; 16]>())
}
