//! Energy models and the tensor utilities they are built from: the binary
//! RBM, its purification variant, complex tensor pairs and the bridge
//! between host-side spin configurations and burn tensors.

pub mod bridge;
pub mod cplx;
pub mod energy;
pub mod functional;
pub mod purification;
pub mod rbm;
