//! 从会话 Cookie 串中提取 CSRF 令牌（`bili_jct`）。
//!
//! 作者：bilidown 项目组
//! 创建时间：2026-10-18
//! 修改时间：2026-10-18

/// 平台写入 CSRF 令牌的 Cookie 名。
pub const CSRF_COOKIE_NAME: &str = "bili_jct";

/// 提取 `bili_jct` 的值。
///
/// 规则：
/// - Cookie 串以 `;` 分隔，忽略每段首尾空白
/// - 出现多次时取最后一次
/// - 不存在时返回 `None`
pub fn extract_csrf(cookie_string: &str) -> Option<&str> {
    cookie_string
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            (name == CSRF_COOKIE_NAME).then_some(value)
        })
        .last()
}
