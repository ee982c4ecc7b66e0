/// 显示窗口, 包含下限 `vmin` 和上限 `vmax`.
///
/// 该窗口是只读的. 若要修改窗口参数, 你应该创建新的实例.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DisplayWindow {
    vmin: f32,
    vmax: f32,
}

impl DisplayWindow {
    /// 构建显示窗口.
    ///
    /// `vmin` 和 `vmax` 必须是有限值且 `vmin < vmax`, 否则返回 `None`.
    pub fn new(vmin: f32, vmax: f32) -> Option<DisplayWindow> {
        (vmin.is_finite() && vmax.is_finite() && vmin < vmax).then_some(Self { vmin, vmax })
    }

    /// 单位窗口 `[0, 1]`.
    pub const fn unit() -> DisplayWindow {
        Self {
            vmin: 0.0,
            vmax: 1.0,
        }
    }

    /// 构建关于 0 对称的窗口 `[-bound, bound]`. `bound` 必须为正有限值.
    #[inline]
    pub fn symmetric(bound: f32) -> Option<DisplayWindow> {
        Self::new(-bound, bound)
    }

    /// 窗下限.
    #[inline]
    pub fn vmin(&self) -> f32 {
        self.vmin
    }

    /// 窗上限.
    #[inline]
    pub fn vmax(&self) -> f32 {
        self.vmax
    }

    /// 窗宽.
    #[inline]
    pub fn width(&self) -> f32 {
        self.vmax - self.vmin
    }

    /// 求在当前窗口设置下, `value` 对应的灰度图像素整数值 (0 <= value <= 255).
    ///
    /// 如果 `value` 无意义 (如 inf, NaN), 则返回 `None`.
    pub fn eval(&self, value: f32) -> Option<u8> {
        self.eval_unit(value).map(|t| (t * 255.0) as u8)
    }

    /// 求在当前窗口设置下, `value` 对应的归一化位置 (0.0 <= value <= 1.0).
    ///
    /// 如果 `value` 无意义 (如 inf, NaN), 则返回 `None`.
    pub fn eval_unit(&self, value: f32) -> Option<f32> {
        if !value.is_finite() {
            return None;
        }
        if value <= self.vmin {
            Some(0.0)
        } else if value >= self.vmax {
            Some(1.0)
        } else {
            Some((value - self.vmin) / self.width())
        }
    }
}

/// 伪彩色映射.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ColorMap {
    /// 灰度, 用于解剖模板.
    Gray,

    /// 黑-红-黄-白, 用于非负统计图.
    Hot,

    /// 青-蓝-黑-红-黄, 用于有正负号的统计图. 0 位于窗口中点.
    ColdHot,
}

impl ColorMap {
    /// 将归一化位置 `t` (0.0 ~ 1.0) 映射为 RGB.
    pub fn rgb(&self, t: f32) -> [u8; 3] {
        let t = num::clamp(t, 0.0, 1.0);
        match self {
            ColorMap::Gray => {
                let g = (t * 255.0) as u8;
                [g, g, g]
            }
            ColorMap::Hot => hot(t),
            ColorMap::ColdHot => {
                if t >= 0.5 {
                    hot((t - 0.5) * 2.0)
                } else {
                    let [r, g, b] = hot((0.5 - t) * 2.0);
                    // 冷色即为热色的通道反转.
                    [b, g, r]
                }
            }
        }
    }
}

/// 三段线性的 hot 色表.
#[inline]
fn hot(t: f32) -> [u8; 3] {
    let channel = |lo: f32| (num::clamp((t - lo) * 3.0, 0.0, 1.0) * 255.0).round() as u8;
    [channel(0.0), channel(1.0 / 3.0), channel(2.0 / 3.0)]
}
