//! 3D 二值形态学操作.
//!
//! 结构元固定为 6-邻域十字 (钻石型). 腐蚀时越界位置视为背景,
//! 因此贴近体数据边缘的前景也会被腐蚀.

use ndarray::{Array3, Zip};

use crate::{BinaryMask, Idx3d, Shape3d, SpatialAttr};

/// 获取 `pos` 前后上下左右六个点的坐标.
///
/// 在数据范围外的坐标会被过滤掉, 不会包含在返回值中.
pub(crate) fn diamond_neighbours((x, y, z): Idx3d, (sx, sy, sz): Shape3d) -> Vec<Idx3d> {
    [
        (x.wrapping_sub(1), y, z),
        (x.saturating_add(1), y, z),
        (x, y.wrapping_sub(1), z),
        (x, y.saturating_add(1), z),
        (x, y, z.wrapping_sub(1)),
        (x, y, z.saturating_add(1)),
    ]
    .into_iter()
    .filter(|(a, b, c)| *a < sx && *b < sy && *c < sz)
    .collect()
}

/// 单次膨胀.
fn dilate_once(data: &Array3<bool>) -> Array3<bool> {
    let shape = data.dim();
    let mut out = data.clone();
    for (pos, _) in data.indexed_iter().filter(|(_, &m)| m) {
        for n in diamond_neighbours(pos, shape) {
            out[n] = true;
        }
    }
    out
}

/// 单次腐蚀. 六个邻居中任一为背景 (或越界) 时被腐蚀.
fn erode_once(data: &Array3<bool>) -> Array3<bool> {
    let shape = data.dim();
    let mut out = data.clone();
    Zip::indexed(&mut out).for_each(|pos, m| {
        if *m {
            let nbs = diamond_neighbours(pos, shape);
            *m = nbs.len() == 6 && nbs.into_iter().all(|n| data[n]);
        }
    });
    out
}

/// 形态学操作实现块
impl BinaryMask {
    /// 迭代 `iterations` 次膨胀.
    pub fn dilate(&self, iterations: usize) -> BinaryMask {
        let mut data = self.data().to_owned();
        for _ in 0..iterations {
            data = dilate_once(&data);
        }
        BinaryMask::new(data, *self.affine())
    }

    /// 迭代 `iterations` 次腐蚀.
    pub fn erode(&self, iterations: usize) -> BinaryMask {
        let mut data = self.data().to_owned();
        for _ in 0..iterations {
            data = erode_once(&data);
        }
        BinaryMask::new(data, *self.affine())
    }

    /// 闭运算: 先膨胀 `iterations` 次, 再腐蚀 `iterations` 次.
    ///
    /// # 注意
    ///
    /// 由于腐蚀把越界视为背景, 贴边的前景可能在闭运算后消失.
    #[inline]
    pub fn close(&self, iterations: usize) -> BinaryMask {
        self.dilate(iterations).erode(iterations)
    }

    /// 开运算: 先腐蚀 `iterations` 次, 再膨胀 `iterations` 次.
    #[inline]
    pub fn opening(&self, iterations: usize) -> BinaryMask {
        self.erode(iterations).dilate(iterations)
    }

    /// 属于 `self.dilate(1)` 但不属于 `self` 的体素, 即外壳.
    pub fn outer_shell(&self) -> BinaryMask {
        let grown = self.dilate(1);
        let mut data = grown.data().to_owned();
        Zip::from(&mut data)
            .and(self.data())
            .for_each(|g, &m| *g &= !m);
        BinaryMask::new(data, *self.affine())
    }
}
