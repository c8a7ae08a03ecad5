//! 帧编解码边界
//!
//! 链路层搬运的是不透明字节帧；本模块是字节与类型化消息之间
//! 唯一的转换入口（bincode 编码）。解码失败对单条消息可恢复：
//! 调度循环记录日志并丢弃该帧，不终止会话。

use crate::command::Command;
use crate::constants::MAX_FRAME_LEN;
use crate::event::Event;
use crate::ProtocolError;
use bytes::Bytes;

/// 编码一条出站命令为链路帧负载
pub fn encode_command(command: &Command) -> Result<Bytes, ProtocolError> {
    let payload =
        bincode::serialize(command).map_err(|e| ProtocolError::Encode(e.to_string()))?;
    if payload.len() > MAX_FRAME_LEN {
        return Err(ProtocolError::InvalidLength {
            max: MAX_FRAME_LEN,
            actual: payload.len(),
        });
    }
    Ok(Bytes::from(payload))
}

/// 解码一条入站链路帧负载为事件
pub fn decode_event(payload: &[u8]) -> Result<Event, ProtocolError> {
    if payload.len() > MAX_FRAME_LEN {
        return Err(ProtocolError::InvalidLength {
            max: MAX_FRAME_LEN,
            actual: payload.len(),
        });
    }
    bincode::deserialize(payload).map_err(|e| ProtocolError::Decode(e.to_string()))
}

/// 编码一条入站事件（仅供测试与模拟引擎使用）
pub fn encode_event(event: &Event) -> Result<Bytes, ProtocolError> {
    let payload = bincode::serialize(event).map_err(|e| ProtocolError::Encode(e.to_string()))?;
    Ok(Bytes::from(payload))
}

/// 解码一条出站命令（仅供测试与模拟引擎使用）
pub fn decode_command(payload: &[u8]) -> Result<Command, ProtocolError> {
    bincode::deserialize(payload).map_err(|e| ProtocolError::Decode(e.to_string()))
}
