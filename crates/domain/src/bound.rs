use std::fmt;

use choreo_core::{ChoreoError, ChoreoResult};
use serde::{Deserialize, Serialize};

/// 执行窗口 `[low, high)`：本次解释过程负责的调用下标范围
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "(usize, usize)", into = "(usize, usize)")]
pub struct ExecutionBound {
    low: usize,
    high: usize,
}

impl ExecutionBound {
    pub fn new(low: usize, high: usize) -> ChoreoResult<Self> {
        if low > high {
            return Err(ChoreoError::malformed(format!(
                "执行窗口无效: [{low}, {high})"
            )));
        }
        Ok(Self { low, high })
    }

    /// 覆盖整个组合的窗口
    pub fn full(len: usize) -> Self {
        Self { low: 0, high: len }
    }

    pub fn low(&self) -> usize {
        self.low
    }

    pub fn high(&self) -> usize {
        self.high
    }

    pub fn is_below(&self, index: usize) -> bool {
        index < self.low
    }

    pub fn is_above(&self, index: usize) -> bool {
        index >= self.high
    }

    pub fn contains(&self, index: usize) -> bool {
        !self.is_below(index) && !self.is_above(index)
    }

    pub fn is_empty(&self) -> bool {
        self.low == self.high
    }

    /// 在下标 `index` 处交给下游主机时携带的窗口 `[index, high)`
    pub fn resume_at(&self, index: usize) -> ChoreoResult<Self> {
        Self::new(index, self.high)
    }

    /// 窗口必须落在组合长度之内
    pub fn check_within(&self, len: usize) -> ChoreoResult<()> {
        if self.high > len {
            return Err(ChoreoError::malformed(format!(
                "执行窗口 {self} 超出组合长度 {len}"
            )));
        }
        Ok(())
    }
}

impl TryFrom<(usize, usize)> for ExecutionBound {
    type Error = ChoreoError;

    fn try_from((low, high): (usize, usize)) -> Result<Self, Self::Error> {
        Self::new(low, high)
    }
}

impl From<ExecutionBound> for (usize, usize) {
    fn from(bound: ExecutionBound) -> Self {
        (bound.low, bound.high)
    }
}

impl fmt::Display for ExecutionBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.low, self.high)
    }
}
