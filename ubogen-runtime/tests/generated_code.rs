//! Exercises code exactly as ubogen emits it against this crate.

mod forward {
    include!("fixtures/forward.rs");
}

use forward::{Forward, Light};
use ubogen_runtime::{BoundsError, Std140, Std140Reader, UniformSink, UniformValue};

#[derive(Default)]
struct RecordingSink {
    calls: Vec<(String, Vec<f32>)>,
}

impl UniformSink for RecordingSink {
    fn set_uniform(&mut self, name: &str, value: UniformValue<'_>) {
        match value {
            UniformValue::Float(v) => self.calls.push((name.to_string(), v.to_vec())),
            other => panic!("unexpected uniform value {:?}", other),
        }
    }

    fn set_uniform_block(&mut self, block: &str, _bytes: &[u8]) {
        panic!("unexpected block upload {}", block);
    }
}

fn light() -> Light {
    Light {
        color: [1.0, 0.5, 0.25],
        w: [0.75, 0.125],
    }
}

#[test]
fn test_serializer_matches_layout() {
    let bytes = light().to_std140_bytes();
    assert_eq!(bytes.len(), Light::STD140_SIZE);

    let reader = Std140Reader::new(&bytes);
    assert_eq!(reader.read_at::<[f32; 3]>(0).unwrap(), [1.0, 0.5, 0.25]);
    assert_eq!(reader.read_at::<f32>(16).unwrap(), 0.75);
    assert_eq!(reader.read_at::<f32>(32).unwrap(), 0.125);
}

#[test]
fn test_struct_uniform_is_set_field_by_field() {
    let mut sink = RecordingSink::default();
    Forward::new(&mut sink).set_sun(&light());

    assert_eq!(
        sink.calls,
        vec![
            ("sun.color".to_string(), vec![1.0, 0.5, 0.25]),
            ("sun.w[0]".to_string(), vec![0.75]),
            ("sun.w[1]".to_string(), vec![0.125]),
        ]
    );
}

#[test]
fn test_indexed_setter_rejects_out_of_range_index() {
    let mut sink = RecordingSink::default();
    let mut bindings = Forward::new(&mut sink);

    assert_eq!(bindings.set_weights_at(3, 2.0), Ok(()));
    assert_eq!(
        bindings.set_weights_at(4, 2.0),
        Err(BoundsError::Index {
            uniform: "weights",
            index: 4,
            length: 4
        })
    );
    assert_eq!(sink.calls, vec![("weights[3]".to_string(), vec![2.0])]);
}

#[test]
fn test_bulk_setter_requires_exact_length() {
    let mut sink = RecordingSink::default();
    let mut bindings = Forward::new(&mut sink);

    for values in [&[1.0f32, 2.0, 3.0][..], &[1.0, 2.0, 3.0, 4.0, 5.0][..]] {
        assert_eq!(
            bindings.set_weights(values),
            Err(BoundsError::Length {
                uniform: "weights",
                expected: 4,
                actual: values.len()
            })
        );
    }
    assert!(sink.calls.is_empty(), "a rejected call must not reach the sink");

    let mut bindings = Forward::new(&mut sink);
    bindings.set_weights(&[1.0, 2.0, 3.0, 4.0]).unwrap();
    let names: Vec<_> = sink.calls.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, vec!["weights[0]", "weights[1]", "weights[2]", "weights[3]"]);
}
