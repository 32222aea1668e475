#![allow(dead_code)]

mod kernels;
mod server;

pub use server::*;

use convtune::{ConvolutionParams, DataType, TensorDescriptor};
use convtune_runtime::{DeviceProperties, client::ComputeClient, server::Handle};
use rand::{Rng, SeedableRng, rngs::StdRng};

pub fn properties() -> DeviceProperties {
    DeviceProperties::new("dummy".to_string(), 4, 256, 64 * 1024)
}

/// A client over a fresh dummy device, along with its counters.
pub fn client() -> (ComputeClient<DummyServer>, DummyStats) {
    client_with(properties(), true)
}

pub fn client_with(properties: DeviceProperties, gemm: bool) -> (ComputeClient<DummyServer>, DummyStats) {
    let server = DummyServer::new(properties, gemm);
    let stats = server.stats();
    (ComputeClient::new(server), stats)
}

pub fn packed(dims: [usize; 4]) -> TensorDescriptor {
    TensorDescriptor::new_packed(DataType::F32, dims)
}

pub fn random(len: usize, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| rng.random_range(-1.0..1.0)).collect()
}

pub fn upload(client: &ComputeClient<DummyServer>, values: &[f32]) -> Handle {
    client.create(bytemuck::cast_slice(values)).unwrap()
}

pub fn zeros(client: &ComputeClient<DummyServer>, len: usize) -> Handle {
    client.empty(len * size_of::<f32>()).unwrap()
}

pub fn download(client: &ComputeClient<DummyServer>, handle: &Handle) -> Vec<f32> {
    let bytes = client.read(handle.binding()).unwrap();
    bytemuck::pod_collect_to_vec(&bytes)
}

pub fn assert_close(actual: &[f32], expected: &[f32]) {
    assert_eq!(actual.len(), expected.len(), "length mismatch");
    for (index, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!(
            (a - e).abs() <= 1e-4 * (1.0 + e.abs()),
            "mismatch at {index}: got {a}, expected {e}"
        );
    }
}

/// Sizes of a packed convolution problem.
#[derive(Debug, Clone, Copy)]
pub struct Problem {
    pub x: [usize; 4],
    pub w: [usize; 4],
    pub params: ConvolutionParams,
}

impl Problem {
    pub fn new(x: [usize; 4], w: [usize; 4], params: ConvolutionParams) -> Self {
        Self { x, w, params }
    }

    pub fn y(&self) -> [usize; 4] {
        let out = |extent: usize, filter: usize, axis: usize| {
            let (pad, stride, dilation) = match axis {
                0 => (self.params.padding.0, self.params.stride.0, self.params.dilation.0),
                _ => (self.params.padding.1, self.params.stride.1, self.params.dilation.1),
            };
            (extent + 2 * pad - dilation * (filter - 1) - 1) / stride + 1
        };
        [
            self.x[0],
            self.w[0],
            out(self.x[2], self.w[2], 0),
            out(self.x[3], self.w[3], 1),
        ]
    }

    /// Visit every multiply-add of the convolution as `(x index, w index, y index)`.
    fn for_each(&self, mut visit: impl FnMut(usize, usize, usize)) {
        let [n, c, h, w] = self.x;
        let [k, _, fh, fw] = self.w;
        let [_, _, oh, ow] = self.y();
        let (pad_h, pad_w) = self.params.padding;
        let (stride_h, stride_w) = self.params.stride;
        let (dil_h, dil_w) = self.params.dilation;

        for b in 0..n {
            for o in 0..k {
                for oy in 0..oh {
                    for ox in 0..ow {
                        for i in 0..c {
                            for fy in 0..fh {
                                let iy = (oy * stride_h + fy * dil_h) as isize - pad_h as isize;
                                if iy < 0 || iy >= h as isize {
                                    continue;
                                }
                                for fx in 0..fw {
                                    let ix = (ox * stride_w + fx * dil_w) as isize - pad_w as isize;
                                    if ix < 0 || ix >= w as isize {
                                        continue;
                                    }
                                    visit(
                                        ((b * c + i) * h + iy as usize) * w + ix as usize,
                                        ((o * c + i) * fh + fy) * fw + fx,
                                        ((b * k + o) * oh + oy) * ow + ox,
                                    );
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    pub fn forward(&self, x: &[f32], w: &[f32]) -> Vec<f32> {
        let mut y = vec![0.0; self.y().iter().product()];
        self.for_each(|xi, wi, yi| y[yi] += x[xi] * w[wi]);
        y
    }

    pub fn backward_data(&self, dy: &[f32], w: &[f32]) -> Vec<f32> {
        let mut dx = vec![0.0; self.x.iter().product()];
        self.for_each(|xi, wi, yi| dx[xi] += dy[yi] * w[wi]);
        dx
    }

    pub fn backward_weights(&self, dy: &[f32], x: &[f32]) -> Vec<f32> {
        let mut dw = vec![0.0; self.w.iter().product()];
        self.for_each(|xi, wi, yi| dw[wi] += dy[yi] * x[xi]);
        dw
    }
}
