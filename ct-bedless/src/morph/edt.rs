//! 精确平方欧氏距离变换.
//!
//! 采用可分离的下包络 (lower envelope) 算法, 依次沿 z, h, w 三个轴做一维变换,
//! 复杂度与体素个数成线性关系, 与结构元半径无关.

use ndarray::{Array3, ArrayView3, Axis};

/// 一维平方距离变换.
///
/// `f[q]` 是位置 `q` 的初始代价, 非有限值表示该位置不是特征点.
/// 计算 `d[q] = min_p ((q - p)^2 + f[p])`. 若不存在特征点, `d` 全部为无穷大.
///
/// `v` 和 `z` 是外部传入的缓冲区, 避免每条扫描线重新分配.
fn edt_1d(f: &[f64], d: &mut [f64], v: &mut Vec<usize>, z: &mut Vec<f64>) {
    debug_assert_eq!(f.len(), d.len());
    v.clear();
    z.clear();

    for (q, &fq) in f.iter().enumerate() {
        if !fq.is_finite() {
            continue;
        }
        let qf = q as f64;
        while let Some(&p) = v.last() {
            let pf = p as f64;
            let s = ((fq + qf * qf) - (f[p] + pf * pf)) / (2.0 * (qf - pf));
            // `z` 与 `v` 等长, 此处 `last` 一定存在.
            if z.last().is_some_and(|&zk| s <= zk) {
                v.pop();
                z.pop();
            } else {
                v.push(q);
                z.push(s);
                break;
            }
        }
        if v.is_empty() {
            v.push(q);
            z.push(f64::NEG_INFINITY);
        }
    }

    if v.is_empty() {
        d.fill(f64::INFINITY);
        return;
    }

    let mut k = 0;
    for (q, dq) in d.iter_mut().enumerate() {
        let qf = q as f64;
        while k + 1 < v.len() && z[k + 1] < qf {
            k += 1;
        }
        let p = v[k];
        let diff = qf - p as f64;
        *dq = diff * diff + f[p];
    }
}

/// 计算每个体素到最近特征体素 (`feature` 为 `true`) 的平方欧氏距离 (以体素为单位).
///
/// 若不存在任何特征体素, 所有距离均为 `f64::INFINITY`. 网格外部不视为特征.
pub(crate) fn squared_edt(feature: ArrayView3<'_, bool>) -> Array3<f64> {
    let mut dist = feature.mapv(|b| if b { 0.0 } else { f64::INFINITY });

    let (nz, nh, nw) = dist.dim();
    let n = nz.max(nh).max(nw);
    let mut f = Vec::with_capacity(n);
    let mut d = vec![0.0; n];
    let mut v = Vec::with_capacity(n);
    let mut z = Vec::with_capacity(n);

    for axis in 0..3 {
        for mut lane in dist.lanes_mut(Axis(axis)) {
            f.clear();
            f.extend(lane.iter().copied());
            let d = &mut d[..f.len()];
            edt_1d(&f, d, &mut v, &mut z);
            lane.iter_mut().zip(d.iter()).for_each(|(a, b)| *a = *b);
        }
    }
    dist
}
