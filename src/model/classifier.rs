//! Transfer classifier: frozen EfficientNet-B0 plus a trainable head
//!
//! Only the head (global average pooling, dropout, dense) learns. During
//! training the backbone runs on the inner, non-autodiff backend, which keeps
//! it out of the gradient graph and puts its BatchNorm layers in inference
//! mode.

use burn::{
    config::Config,
    module::{AutodiffModule, Module},
    nn::{
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        Dropout, DropoutConfig, Linear, LinearConfig,
    },
    tensor::{
        backend::{AutodiffBackend, Backend},
        Tensor,
    },
};

use super::efficientnet::{EfficientNetB0, FEATURE_CHANNELS};

/// Configuration for the TransferClassifier model
#[derive(Config, Debug)]
pub struct TransferClassifierConfig {
    /// Number of output classes
    pub num_classes: usize,

    /// Dropout rate applied to the pooled features
    #[config(default = "0.3")]
    pub dropout: f64,
}

impl TransferClassifierConfig {
    /// Randomly initialized model; the backbone starts frozen
    pub fn init<B: Backend>(&self, device: &B::Device) -> TransferClassifier<B> {
        TransferClassifier {
            backbone: EfficientNetB0::new(device).no_grad(),
            head: ClassifierHead::new(self.num_classes, self.dropout, device),
            num_classes: self.num_classes,
        }
    }
}

/// Global average pooling -> dropout -> dense
#[derive(Module, Debug)]
pub struct ClassifierHead<B: Backend> {
    pub pool: AdaptiveAvgPool2d,
    pub dropout: Dropout,
    pub fc: Linear<B>,
}

impl<B: Backend> ClassifierHead<B> {
    pub fn new(num_classes: usize, dropout: f64, device: &B::Device) -> Self {
        Self {
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            dropout: DropoutConfig::new(dropout).init(),
            fc: LinearConfig::new(FEATURE_CHANNELS, num_classes).init(device),
        }
    }

    /// Feature map `[N, 1280, h, w]` to logits `[N, num_classes]`
    pub fn forward(&self, features: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.pool.forward(features);

        // Flatten: [N, C, 1, 1] -> [N, C]
        let [batch_size, channels, _, _] = x.dims();
        let x = x.reshape([batch_size, channels]);

        let x = self.dropout.forward(x);
        self.fc.forward(x)
    }
}

#[derive(Module, Debug)]
pub struct TransferClassifier<B: Backend> {
    pub backbone: EfficientNetB0<B>,
    pub head: ClassifierHead<B>,
    num_classes: usize,
}

impl<B: Backend> TransferClassifier<B> {
    /// Swap in a different backbone (e.g. pretrained weights), frozen
    pub fn with_backbone(mut self, backbone: EfficientNetB0<B>) -> Self {
        self.backbone = backbone.no_grad();
        self
    }

    /// Forward pass through the network
    ///
    /// # Arguments
    /// * `images` - Normalized images of shape [batch_size, 3, height, width]
    ///
    /// # Returns
    /// * Logits tensor of shape [batch_size, num_classes]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let features = self.backbone.forward(images);
        self.head.forward(features)
    }

    /// Forward with softmax for inference
    pub fn forward_softmax(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let logits = self.forward(images);
        burn::tensor::activation::softmax(logits, 1)
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Parameters updated by training (the head)
    pub fn num_trainable_params(&self) -> usize {
        self.head.num_params()
    }

    /// Parameters of the frozen backbone
    pub fn num_frozen_params(&self) -> usize {
        self.backbone.num_params()
    }
}

impl<B: AutodiffBackend> TransferClassifier<B> {
    /// Training forward pass with the backbone outside the autodiff graph
    pub fn forward_frozen(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let features = self.backbone.valid().forward(images.inner());
        self.head.forward(Tensor::from_inner(features))
    }
}
