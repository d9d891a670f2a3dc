//! Neural Network inference.
//!
//! Networks are loaded from ONNX files and run on the CPU with [`tract_onnx`].

use std::{ops::RangeInclusive, path::Path, sync::Arc};

use anyhow::Context;
use tract_onnx::prelude::{
    tract_ndarray::{self, ArrayViewD},
    Framework, Graph, InferenceModelExt, IntoTensor, SimplePlan, TValue, Tensor, TypedFact, TypedOp,
};

use crate::image::{Color, Image, Resolution, RotatedRect};

type Model = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// A convolutional neural network (CNN) that operates on image data.
///
/// Like the underlying [`NeuralNetwork`], this is a cheaply [`Clone`]able handle to the underlying
/// data.
#[derive(Clone)]
pub struct Cnn {
    nn: NeuralNetwork,
    input_res: Resolution,
    shape: CnnInputShape,
    color_mapper: ColorMapper,
}

impl Cnn {
    /// Creates a CNN wrapper from a [`NeuralNetwork`].
    ///
    /// The network must have exactly one input with a shape that matches the given
    /// [`CnnInputShape`].
    pub fn new(
        nn: NeuralNetwork,
        shape: CnnInputShape,
        color_mapper: ColorMapper,
    ) -> anyhow::Result<Self> {
        let input_res = Self::get_input_res(&nn, shape)?;
        Ok(Self {
            nn,
            input_res,
            shape,
            color_mapper,
        })
    }

    fn get_input_res(nn: &NeuralNetwork, shape: CnnInputShape) -> anyhow::Result<Resolution> {
        if nn.num_inputs() != 1 {
            anyhow::bail!(
                "CNN network has to take exactly 1 input, this one takes {}",
                nn.num_inputs(),
            );
        }

        let tensor_shape = nn.input_shape(0);
        let (w, h) = match (shape, tensor_shape) {
            (CnnInputShape::NCHW, [1, 3, h, w]) | (CnnInputShape::NHWC, [1, h, w, 3]) => (*w, *h),
            _ => {
                anyhow::bail!(
                    "invalid model input shape for {:?} CNN: {:?}",
                    shape,
                    tensor_shape,
                );
            }
        };

        let (w, h): (u32, u32) = (w.try_into()?, h.try_into()?);
        Ok(Resolution::new(w, h))
    }

    /// Returns the expected input image size.
    #[inline]
    pub fn input_resolution(&self) -> Resolution {
        self.input_res
    }

    /// Runs the network on the part of `image` covered by `rect`, returning the estimated outputs.
    ///
    /// `rect` is sampled with nearest-neighbor sampling to create the network's input tensor.
    /// Parts of `rect` outside of `image` are read as black. If the aspect ratio of `rect` does
    /// not match the network's input aspect ratio, the image will be stretched.
    pub fn estimate(&self, image: &Image, rect: &RotatedRect) -> anyhow::Result<Outputs> {
        let (w, h) = (
            self.input_res.width() as usize,
            self.input_res.height() as usize,
        );

        let pixels = (0..h)
            .flat_map(|y| (0..w).map(move |x| (x, y)))
            .map(|(x, y)| {
                let u = (x as f32 + 0.5) / w as f32;
                let v = (y as f32 + 0.5) / h as f32;
                let [sx, sy] = rect.transform_out(u, v);
                self.color_mapper.map(image.sample(sx, sy))
            })
            .collect::<Vec<_>>();

        let input = match self.shape {
            CnnInputShape::NCHW => {
                tract_ndarray::Array4::from_shape_fn((1, 3, h, w), |(_, c, y, x)| {
                    pixels[y * w + x][c]
                })
            }
            CnnInputShape::NHWC => {
                tract_ndarray::Array4::from_shape_fn((1, h, w, 3), |(_, y, x, c)| {
                    pixels[y * w + x][c]
                })
            }
        };

        self.nn.estimate([Tensor::from(input)])
    }
}

#[derive(Clone)]
enum ColorMapperKind {
    Linear { target_range: RangeInclusive<f32> },
}

/// Maps 8-bit colors to the floating-point values a network expects.
#[derive(Clone)]
pub struct ColorMapper {
    kind: ColorMapperKind,
}

impl ColorMapper {
    /// Creates a simple color mapper that uniformly maps sRGB values to `target_range`.
    ///
    /// Note that this operates on *non-linear* sRGB colors, but maps them linearly to the target
    /// range. The alpha channel is ignored.
    pub fn linear(target_range: RangeInclusive<f32>) -> Self {
        let start = *target_range.start();
        let end = *target_range.end();
        assert!(end > start);

        Self {
            kind: ColorMapperKind::Linear { target_range },
        }
    }

    fn map(&self, color: Color) -> [f32; 3] {
        match &self.kind {
            ColorMapperKind::Linear { target_range } => {
                let start = *target_range.start();
                let end = *target_range.end();

                let adjust_range = (end - start) / 255.0;
                let rgb = [color.r(), color.g(), color.b()];
                rgb.map(|col| col as f32 * adjust_range + start)
            }
        }
    }
}

/// Describes in what order a CNN expects its input image data.
///
/// - `N` is the number of images, fixed at 1.
/// - `C` is the number of color channels, 3 for RGB inputs.
/// - `H` and `W` are the height and width of the input, respectively.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CnnInputShape {
    /// Shape is `[N, C, H, W]`.
    NCHW,
    /// Shape is `[N, H, W, C]`.
    NHWC,
}

/// A neural network that can be used for inference.
///
/// This is a cheaply [`Clone`]able handle to the underlying network structures.
#[derive(Clone)]
pub struct NeuralNetwork(Arc<NeuralNetworkImpl>);

struct NeuralNetworkImpl {
    inner: Model,
    input_shapes: Vec<Vec<usize>>,
}

impl NeuralNetwork {
    /// Loads and optimizes a pre-trained model from an ONNX file path.
    ///
    /// The path must have a `.onnx` extension.
    pub fn from_path<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        Self::from_path_impl(path.as_ref())
    }

    fn from_path_impl(path: &Path) -> anyhow::Result<Self> {
        match path.extension() {
            Some(ext) if ext == "onnx" => {}
            _ => anyhow::bail!(
                "neural network file '{}' must have `.onnx` extension",
                path.display()
            ),
        }

        let model_data = std::fs::read(path)
            .with_context(|| format!("failed to read network '{}'", path.display()))?;
        Self::from_onnx(&model_data)
            .with_context(|| format!("failed to load network '{}'", path.display()))
    }

    /// Loads and optimizes a pre-trained model from an in-memory ONNX file.
    ///
    /// Returns an error if the network data is malformed, incomplete, uses unimplemented
    /// operations, or has inputs of symbolic size.
    pub fn from_onnx(raw: &[u8]) -> anyhow::Result<Self> {
        let graph = tract_onnx::onnx()
            .model_for_read(&mut &*raw)?
            .into_optimized()?;
        let inner = graph.into_runnable()?;

        let input_shapes = (0..inner.model().inputs.len())
            .map(|id| {
                let fact = inner.model().input_fact(id)?;
                fact.shape
                    .as_concrete()
                    .map(|shape| shape.to_vec())
                    .ok_or_else(|| anyhow::anyhow!("network input {id} has a symbolic shape"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(Self(Arc::new(NeuralNetworkImpl {
            inner,
            input_shapes,
        })))
    }

    /// Returns the number of input nodes of the network.
    pub fn num_inputs(&self) -> usize {
        self.0.input_shapes.len()
    }

    /// Returns the number of output nodes of the network.
    pub fn num_outputs(&self) -> usize {
        self.0.inner.model().outputs.len()
    }

    /// Returns the tensor shape of input `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not less than [`NeuralNetwork::num_inputs`].
    pub fn input_shape(&self, index: usize) -> &[usize] {
        &self.0.input_shapes[index]
    }

    /// Runs the network on a set of input tensors, returning the estimated [`Outputs`].
    #[doc(alias = "infer")]
    pub fn estimate(&self, inputs: impl IntoIterator<Item = Tensor>) -> anyhow::Result<Outputs> {
        let inputs = inputs
            .into_iter()
            .map(|t| TValue::from_const(Arc::new(t)))
            .collect();
        let outputs = self.0.inner.run(inputs)?;

        Ok(Outputs {
            inner: outputs.into_iter().map(|v| v.into_tensor()).collect(),
        })
    }
}

/// The result of a neural network inference pass.
///
/// This is a list of tensors corresponding to the network's output nodes.
#[derive(Debug)]
pub struct Outputs {
    inner: Vec<Tensor>,
}

impl Outputs {
    /// Returns the number of tensors in this inference output.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns output tensor `index` as an `f32` array view.
    pub fn view(&self, index: usize) -> anyhow::Result<ArrayViewD<'_, f32>> {
        let tensor = self
            .inner
            .get(index)
            .ok_or_else(|| anyhow::anyhow!("network has no output {index}"))?;
        tensor.to_array_view::<f32>()
    }

    /// Returns output tensor `index` as a flat list of `f32`s, after checking its shape.
    pub fn flat(&self, index: usize, expected_shape: &[usize]) -> anyhow::Result<Vec<f32>> {
        let view = self.view(index)?;
        anyhow::ensure!(
            view.shape() == expected_shape,
            "network output {index} has shape {:?}, expected {:?}",
            view.shape(),
            expected_shape,
        );
        Ok(view.iter().copied().collect())
    }
}
