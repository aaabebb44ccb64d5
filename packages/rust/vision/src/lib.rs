//! Vision collaborators: primary classifiers, defect detectors and the box
//! annotator, each in a live and an offline flavour where it matters.

pub mod annotate;
pub mod classifier;
pub mod detector;

pub use annotate::{BoxAnnotator, annotated_name};
pub use classifier::{EndpointClassifier, HeuristicClassifier};
pub use detector::{RoboflowDetector, StaticDetector};
