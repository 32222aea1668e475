//! CPU versions of the device kernels, driven by the compile definitions of their plan.

use convtune::{GemmGeometry, Im2ColArgs};
use convtune_runtime::{kernel::KernelPlan, server::ScalarArg};
use core::time::Duration;

/// Result of a kernel: which buffer it wrote and how many multiply-adds it did.
pub struct KernelRun {
    pub output: usize,
    pub work: usize,
}

/// Run the kernel described by `plan` over `buffers`, updated in place.
pub fn run(
    plan: &KernelPlan,
    scalars: &[ScalarArg],
    buffers: &mut [Vec<f32>],
) -> Result<KernelRun, String> {
    let defines = Defines(plan);

    match plan.entry.as_str() {
        "conv_direct_1x1" | "conv_direct_11x11" | "conv_direct_11x11_pass2" | "conv_direct_generic" => {
            direct(&defines, buffers)
        }
        "conv_winograd_3x3_fwd" => winograd(&defines, scalars, buffers),
        "conv_bwd_weights_main" => backward_weights_main(&defines, buffers),
        "conv_bwd_weights_red" => backward_weights_reduction(&defines, buffers),
        "conv_bwd_bias" => backward_bias(&defines, buffers),
        entry => Err(format!("unknown entry point {entry}")),
    }
}

/// Simulated time of a kernel: a cost per multiply-add that depends on the kernel and its tiling,
/// plus a fixed launch overhead.
pub fn simulated_time(plan: &KernelPlan, work: usize) -> Duration {
    let defines = Defines(plan);
    let picos_per_mac = match plan.entry.as_str() {
        "conv_direct_1x1" => 900,
        "conv_direct_11x11" | "conv_direct_11x11_pass2" => 1_500,
        "conv_direct_generic" => {
            let tile = defines.get("OUT_TILE0").unwrap_or(1) as u64;
            let group = plan.local.count() as u64;
            // Bigger tiles reuse more inputs, 128 items groups hit the sweet spot.
            4_000 / tile + if group == 128 { 0 } else { 200 }
        }
        "conv_winograd_3x3_fwd" => 700,
        "conv_bwd_weights_main" => 1_800,
        "conv_bwd_weights_red" => 500,
        "conv_bwd_bias" => 400,
        _ => 1_000,
    };

    Duration::from_nanos(1_000) + Duration::from_nanos(work as u64 * picos_per_mac / 1_000)
}

pub fn unfold_time(args: &Im2ColArgs) -> Duration {
    Duration::from_nanos(500 + args.col_len() as u64 / 4)
}

pub fn gemm_time(geometry: &GemmGeometry) -> Duration {
    let macs = (geometry.m * geometry.n * geometry.k) as u64;
    Duration::from_nanos(2_000 + macs * 300 / 1_000)
}

struct Defines<'a>(&'a KernelPlan);

impl Defines<'_> {
    fn get(&self, name: &str) -> Option<usize> {
        self.0.options.get(name)
    }

    fn usize(&self, name: &str) -> Result<usize, String> {
        self.get(name)
            .ok_or_else(|| format!("missing definition {name}"))
    }
}

/// Sizes and strides of a convolution, in forward terms.
struct Conv {
    n: usize,
    c: usize,
    h: usize,
    w: usize,
    k: usize,
    out_h: usize,
    out_w: usize,
    fh: usize,
    fw: usize,
    pad: (usize, usize),
    stride: (usize, usize),
    dilation: (usize, usize),
    x_strides: [usize; 3],
    w_strides: [usize; 3],
    y_strides: [usize; 3],
}

impl Conv {
    fn new(defines: &Defines<'_>) -> Result<Self, String> {
        Ok(Self {
            n: defines.usize("BATCH_SZ")?,
            c: defines.usize("N_INPUTS")?,
            h: defines.usize("IN_HEIGHT")?,
            w: defines.usize("IN_WIDTH")?,
            k: defines.usize("N_OUTPUTS")?,
            out_h: defines.usize("OUT_HEIGHT")?,
            out_w: defines.usize("OUT_WIDTH")?,
            fh: defines.usize("FILTER_H")?,
            fw: defines.usize("FILTER_W")?,
            pad: (defines.usize("PAD_H")?, defines.usize("PAD_W")?),
            stride: (defines.usize("STRIDE_H")?, defines.usize("STRIDE_W")?),
            dilation: (defines.usize("DILATION_H")?, defines.usize("DILATION_W")?),
            x_strides: [
                defines.usize("IN_BATCH_STRIDE")?,
                defines.usize("IN_CHANNEL_STRIDE")?,
                defines.usize("IN_ROW_STRIDE")?,
            ],
            w_strides: [
                defines.usize("WEI_BATCH_STRIDE")?,
                defines.usize("WEI_CHANNEL_STRIDE")?,
                defines.usize("WEI_ROW_STRIDE")?,
            ],
            y_strides: [
                defines.usize("OUT_BATCH_STRIDE")?,
                defines.usize("OUT_CHANNEL_STRIDE")?,
                defines.usize("OUT_ROW_STRIDE")?,
            ],
        })
    }

    fn x(&self, n: usize, c: usize, row: usize, col: usize) -> usize {
        n * self.x_strides[0] + c * self.x_strides[1] + row * self.x_strides[2] + col
    }

    fn w(&self, k: usize, c: usize, i: usize, j: usize) -> usize {
        k * self.w_strides[0] + c * self.w_strides[1] + i * self.w_strides[2] + j
    }

    fn y(&self, n: usize, k: usize, row: usize, col: usize) -> usize {
        n * self.y_strides[0] + k * self.y_strides[1] + row * self.y_strides[2] + col
    }

    /// Input pixel read by output pixel `out` through filter tap `tap`, if not padding.
    fn input_pos(&self, out: usize, tap: usize, axis: usize) -> Option<usize> {
        let (stride, dilation, pad, extent) = match axis {
            0 => (self.stride.0, self.dilation.0, self.pad.0, self.h),
            _ => (self.stride.1, self.dilation.1, self.pad.1, self.w),
        };
        (out * stride + tap * dilation)
            .checked_sub(pad)
            .filter(|pos| *pos < extent)
    }

    /// Output pixel reading input pixel `input` through filter tap `tap`, if any.
    fn output_pos(&self, input: usize, tap: usize, axis: usize) -> Option<usize> {
        let (stride, dilation, pad, extent) = match axis {
            0 => (self.stride.0, self.dilation.0, self.pad.0, self.out_h),
            _ => (self.stride.1, self.dilation.1, self.pad.1, self.out_w),
        };
        (input + pad)
            .checked_sub(tap * dilation)
            .filter(|pos| pos % stride == 0)
            .map(|pos| pos / stride)
            .filter(|pos| *pos < extent)
    }
}

fn direct(defines: &Defines<'_>, buffers: &mut [Vec<f32>]) -> Result<KernelRun, String> {
    let conv = Conv::new(defines)?;
    let forward = defines.get("CONV_DIR_FORWARD") == Some(1);
    let rows = defines.usize("ROW_BEGIN")?..defines.usize("ROW_END")?;
    let [src, weights, dst] = buffers else {
        return Err("the direct kernels take 3 buffers".to_string());
    };
    let mut work = 0;

    if forward {
        for n in 0..conv.n {
            for k in 0..conv.k {
                for oy in rows.clone() {
                    for ox in 0..conv.out_w {
                        let mut acc = 0.0;
                        for c in 0..conv.c {
                            for i in 0..conv.fh {
                                let Some(iy) = conv.input_pos(oy, i, 0) else { continue };
                                for j in 0..conv.fw {
                                    let Some(ix) = conv.input_pos(ox, j, 1) else { continue };
                                    acc += src[conv.x(n, c, iy, ix)] * weights[conv.w(k, c, i, j)];
                                    work += 1;
                                }
                            }
                        }
                        dst[conv.y(n, k, oy, ox)] = acc;
                    }
                }
            }
        }
    } else {
        for n in 0..conv.n {
            for c in 0..conv.c {
                for iy in rows.clone() {
                    for ix in 0..conv.w {
                        let mut acc = 0.0;
                        for k in 0..conv.k {
                            for i in 0..conv.fh {
                                let Some(oy) = conv.output_pos(iy, i, 0) else { continue };
                                for j in 0..conv.fw {
                                    let Some(ox) = conv.output_pos(ix, j, 1) else { continue };
                                    acc += src[conv.y(n, k, oy, ox)] * weights[conv.w(k, c, i, j)];
                                    work += 1;
                                }
                            }
                        }
                        dst[conv.x(n, c, iy, ix)] = acc;
                    }
                }
            }
        }
    }

    Ok(KernelRun { output: 2, work })
}

fn winograd(
    defines: &Defines<'_>,
    scalars: &[ScalarArg],
    buffers: &mut [Vec<f32>],
) -> Result<KernelRun, String> {
    let [n, c, h, w, k, ..] = scalars else {
        return Err("the transform domain kernel takes 8 scalars".to_string());
    };
    let (n, c, h, w, k) = (
        n.as_i32() as usize,
        c.as_i32() as usize,
        h.as_i32() as usize,
        w.as_i32() as usize,
        k.as_i32() as usize,
    );
    let (pad_h, pad_w) = (defines.usize("PAD_H")?, defines.usize("PAD_W")?);
    let (out_h, out_w) = (h + 2 * pad_h - 2, w + 2 * pad_w - 2);
    let [x, weights, y] = buffers else {
        return Err("the transform domain kernel takes 3 buffers".to_string());
    };
    let mut work = 0;

    for b in 0..n {
        for o in 0..k {
            for oy in 0..out_h {
                for ox in 0..out_w {
                    let mut acc = 0.0;
                    for i in 0..c {
                        for fy in 0..3 {
                            let Some(iy) = (oy + fy).checked_sub(pad_h).filter(|v| *v < h) else {
                                continue;
                            };
                            for fx in 0..3 {
                                let Some(ix) = (ox + fx).checked_sub(pad_w).filter(|v| *v < w)
                                else {
                                    continue;
                                };
                                acc += x[((b * c + i) * h + iy) * w + ix]
                                    * weights[((o * c + i) * 3 + fy) * 3 + fx];
                            }
                        }
                    }
                    // The transform does a fixed amount of work per output tile.
                    work += c * 4;
                    y[((b * k + o) * out_h + oy) * out_w + ox] = acc;
                }
            }
        }
    }

    Ok(KernelRun { output: 2, work })
}

fn backward_weights_main(defines: &Defines<'_>, buffers: &mut [Vec<f32>]) -> Result<KernelRun, String> {
    let conv = Conv::new(defines)?;
    let per_group = defines.usize("BATCH_PER_GROUP")?;
    let groups = defines.usize("N_BATCH_GROUPS")?;
    let partial = defines.get("PARTIAL_OUTPUT") == Some(1);
    let [dy, x, out] = buffers else {
        return Err("the weight gradient takes 3 buffers".to_string());
    };
    let weights_len = conv.k * conv.c * conv.fh * conv.fw;
    let mut work = 0;

    for group in 0..groups {
        let batch = group * per_group..usize::min((group + 1) * per_group, conv.n);
        for k in 0..conv.k {
            for c in 0..conv.c {
                for i in 0..conv.fh {
                    for j in 0..conv.fw {
                        let mut acc = 0.0;
                        for n in batch.clone() {
                            for oy in 0..conv.out_h {
                                let Some(iy) = conv.input_pos(oy, i, 0) else { continue };
                                for ox in 0..conv.out_w {
                                    let Some(ix) = conv.input_pos(ox, j, 1) else { continue };
                                    acc += dy[conv.y(n, k, oy, ox)] * x[conv.x(n, c, iy, ix)];
                                    work += 1;
                                }
                            }
                        }

                        let index = if partial {
                            group * weights_len + ((k * conv.c + c) * conv.fh + i) * conv.fw + j
                        } else {
                            conv.w(k, c, i, j)
                        };
                        out[index] = acc;
                    }
                }
            }
        }
    }

    Ok(KernelRun { output: 2, work })
}

fn backward_weights_reduction(
    defines: &Defines<'_>,
    buffers: &mut [Vec<f32>],
) -> Result<KernelRun, String> {
    let groups = defines.usize("N_BATCH_GROUPS")?;
    let (k, c) = (defines.usize("N_OUTPUTS")?, defines.usize("N_INPUTS")?);
    let (fh, fw) = (defines.usize("FILTER_H")?, defines.usize("FILTER_W")?);
    let strides = [
        defines.usize("WEI_BATCH_STRIDE")?,
        defines.usize("WEI_CHANNEL_STRIDE")?,
        defines.usize("WEI_ROW_STRIDE")?,
    ];
    let [partials, dw] = buffers else {
        return Err("the reduction takes 2 buffers".to_string());
    };
    let weights_len = k * c * fh * fw;

    for o in 0..k {
        for i in 0..c {
            for y in 0..fh {
                for x in 0..fw {
                    let packed = ((o * c + i) * fh + y) * fw + x;
                    let sum = (0..groups)
                        .map(|group| partials[group * weights_len + packed])
                        .sum();
                    dw[o * strides[0] + i * strides[1] + y * strides[2] + x] = sum;
                }
            }
        }
    }

    Ok(KernelRun {
        output: 1,
        work: groups * weights_len,
    })
}

fn backward_bias(defines: &Defines<'_>, buffers: &mut [Vec<f32>]) -> Result<KernelRun, String> {
    let batch = defines.usize("OUT_BATCH_SZ")?;
    let map = defines.usize("OUT_WIDTH")? * defines.usize("OUT_HEIGHT")?;
    let batch_stride = defines.usize("OUT_BATCH_STRIDE")?;
    let channel_stride = defines.usize("OUT_CHANNEL_STRIDE")?;
    let [dy, db] = buffers else {
        return Err("the bias gradient takes 2 buffers".to_string());
    };

    for (k, value) in db.iter_mut().enumerate() {
        *value = (0..batch)
            .flat_map(|n| (0..map).map(move |p| n * batch_stride + k * channel_stride + p))
            .map(|index| dy[index])
            .sum();
    }

    Ok(KernelRun {
        output: 1,
        work: batch * map * db.len(),
    })
}

/// Unfold one packed input sample into a `C·fh·fw × out_h·out_w` column matrix.
pub fn im2col(args: &Im2ColArgs, x: &[f32], col: &mut [f32]) -> Result<(), String> {
    if col.len() < args.col_len() {
        return Err(format!("column buffer holds {} values, needs {}", col.len(), args.col_len()));
    }

    let out_len = args.out_h * args.out_w;
    for c in 0..args.channels {
        for i in 0..args.filter_h {
            for j in 0..args.filter_w {
                let row = (c * args.filter_h + i) * args.filter_w + j;
                for oy in 0..args.out_h {
                    for ox in 0..args.out_w {
                        let iy = (oy * args.stride_h + i * args.dilation_h)
                            .checked_sub(args.pad_h)
                            .filter(|v| *v < args.in_h);
                        let ix = (ox * args.stride_w + j * args.dilation_w)
                            .checked_sub(args.pad_w)
                            .filter(|v| *v < args.in_w);

                        col[row * out_len + oy * args.out_w + ox] = match (iy, ix) {
                            (Some(iy), Some(ix)) => x[(c * args.in_h + iy) * args.in_w + ix],
                            _ => 0.0,
                        };
                    }
                }
            }
        }
    }

    Ok(())
}

/// Row major `c (+)= op(a) · op(b)`.
pub fn gemm(
    geometry: &GemmGeometry,
    a: &[f32],
    b: &[f32],
    c: &mut [f32],
    accumulate: bool,
) -> Result<(), String> {
    let GemmGeometry { m, n, k, .. } = *geometry;
    if a.len() < m * k || b.len() < k * n || c.len() < m * n {
        return Err(format!("operands too small for a {m}x{n}x{k} product"));
    }

    let a_at = |row: usize, inner: usize| {
        if geometry.transpose_a { a[inner * m + row] } else { a[row * k + inner] }
    };
    let b_at = |inner: usize, col: usize| {
        if geometry.transpose_b { b[col * k + inner] } else { b[inner * n + col] }
    };

    for row in 0..m {
        for col in 0..n {
            let dot: f32 = (0..k).map(|inner| a_at(row, inner) * b_at(inner, col)).sum();
            let out = &mut c[row * n + col];
            *out = if accumulate { *out + dot } else { dot };
        }
    }

    Ok(())
}
