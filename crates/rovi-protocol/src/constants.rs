//! 协议常量定义

/// 协议帧格式版本
///
/// 握手时 `ConnectionInfo.protocol_version` 必须与此值严格相等，
/// 否则会话在任何应用消息之前即以版本不兼容失败。
pub const PROTOCOL_VERSION: u32 = 3;

/// 伴侣应用（引擎）SDK 服务默认监听端口
pub const DEFAULT_PORT: u16 = 5106;

/// SDK 构建版本（与引擎构建版本做 semver 兼容性比较）
pub const SDK_BUILD_VERSION: &str = env!("CARGO_PKG_VERSION");

/// 单帧最大字节数（编码后）
///
/// 超出该长度的帧视为协议错误，防止坏长度前缀导致的超大分配。
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// SDK 发起的动作 ID 区间下界
///
/// 引擎内部行为与游戏层使用其他区间，完成事件据此区分来源。
pub const FIRST_SDK_ACTION_TAG: u32 = 100_000;

/// SDK 发起的动作 ID 区间上界（到达后回绕到下界）
pub const LAST_SDK_ACTION_TAG: u32 = 199_999;

/// 判断引擎与 SDK 构建版本是否兼容
///
/// 规则沿用引擎端约定：完全相等，或 major.minor 相同
/// （仅补丁版本差异的热修复允许继续连接）。
/// 任一侧版本无法解析时视为不兼容。
pub fn build_versions_compatible(engine: &str, sdk: &str) -> bool {
    if engine == sdk {
        return true;
    }
    let (Ok(engine), Ok(sdk)) = (
        semver::Version::parse(engine),
        semver::Version::parse(sdk),
    ) else {
        return false;
    };
    engine.major == sdk.major && engine.minor == sdk.minor
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 测试完全相等的版本号兼容
    #[test]
    fn test_equal_versions_compatible() {
        assert!(build_versions_compatible("1.2.3", "1.2.3"));
    }

    /// 测试仅补丁版本差异兼容
    #[test]
    fn test_patch_difference_compatible() {
        assert!(build_versions_compatible("1.2.9", "1.2.3"));
    }

    /// 测试 minor 版本差异不兼容
    #[test]
    fn test_minor_difference_incompatible() {
        assert!(!build_versions_compatible("1.3.0", "1.2.3"));
        assert!(!build_versions_compatible("2.2.3", "1.2.3"));
    }

    /// 测试无法解析的版本号不兼容
    #[test]
    fn test_unparseable_version_incompatible() {
        assert!(!build_versions_compatible("dev-build", "1.2.3"));
        assert!(!build_versions_compatible("1.2.3", "not-a-version"));
    }
}
