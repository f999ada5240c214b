//! 登录密码字段加密。
//!
//! 平台登录接口要求的密码字段格式（逐字节约定）：
//! - 明文为 `hash ++ password`（盐在前，无分隔符）
//! - 使用平台下发的 RSA 公钥、PKCS#1 v1.5 填充加密
//! - 密文以标准 base64（带填充）编码
//!
//! 公钥与盐每次登录前重新获取，本模块不做任何缓存。
//!
//! 作者：bilidown 项目组
//! 创建时间：2026-10-18
//! 修改时间：2026-10-18

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::{Pkcs1v15Encrypt, RsaPublicKey};
use thiserror::Error;

/// 密码加密错误。
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("加密公钥解析失败: {0}")]
    BadKey(String),
    #[error("密码加密失败: {0}")]
    Encrypt(String),
}

/// 拼接加密前的明文。
pub fn salted_plaintext(hash: &str, password: &str) -> String {
    format!("{hash}{password}")
}

/// 解析 PEM 公钥。
///
/// 支持：
/// - `BEGIN PUBLIC KEY`（SPKI，平台实际下发的格式）
/// - `BEGIN RSA PUBLIC KEY`（PKCS#1）
pub fn parse_public_key(pem: &str) -> Result<RsaPublicKey, CryptoError> {
    let pem = pem.trim();
    RsaPublicKey::from_public_key_pem(pem)
        .or_else(|spki_err| {
            RsaPublicKey::from_pkcs1_pem(pem).map_err(|_| CryptoError::BadKey(spki_err.to_string()))
        })
}

/// 按平台约定加密登录密码。
///
/// 参数：
/// - `pem`：平台下发的公钥
/// - `hash`：平台下发的盐
/// - `password`：用户输入的明文密码
///
/// 返回值：
/// - base64 编码的密文
///
/// 异常处理：
/// - 公钥无法解析：`BadKey`
/// - 明文超过密钥可容纳长度等：`Encrypt`
pub fn encrypt_password(pem: &str, hash: &str, password: &str) -> Result<String, CryptoError> {
    let key = parse_public_key(pem)?;
    let plaintext = salted_plaintext(hash, password);
    let cipher = key
        .encrypt(&mut rand::thread_rng(), Pkcs1v15Encrypt, plaintext.as_bytes())
        .map_err(|e| CryptoError::Encrypt(e.to_string()))?;
    Ok(STANDARD.encode(cipher))
}
