// Generated by ubogen. Do not edit.

use ubogen_runtime::{AsUniform, BoundsError, Std140, UniformSink, pad};

/// std140: 48 bytes, aligned to 16.
#[allow(non_snake_case)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Light {
    pub color: [f32; 3],
    pub w: [f32; 2],
}

impl Std140 for Light {
    const STD140_SIZE: usize = 48;

    fn write_std140(&self, output: &mut Vec<u8>) {
        let val = self;
        let initial_size = output.len();
        val.color.write_std140(output);
        pad(output, 4);
        val.w[0].write_std140(output);
        pad(output, 12);
        val.w[1].write_std140(output);
        pad(output, 12);
        assert_eq!(output.len() - initial_size, Self::STD140_SIZE);
    }
}

/// Uniform setters for the `Forward` stage.
pub struct Forward<'a> {
    sink: &'a mut dyn UniformSink,
}

impl<'a> Forward<'a> {
    pub fn new(sink: &'a mut dyn UniformSink) -> Self {
        Forward { sink }
    }

    pub fn set_sun(&mut self, value: &Light) {
        self.set_light_fields("sun", value);
    }

    pub fn set_weights_at(&mut self, index: usize, value: f32) -> Result<(), BoundsError> {
        if index >= 4 {
            return Err(BoundsError::Index { uniform: "weights", index, length: 4 });
        }
        self.sink.set_uniform(&format!("weights[{index}]"), value.as_uniform());
        Ok(())
    }

    pub fn set_weights(&mut self, values: &[f32]) -> Result<(), BoundsError> {
        if values.len() != 4 {
            return Err(BoundsError::Length { uniform: "weights", expected: 4, actual: values.len() });
        }
        for (index, value) in values.iter().enumerate() {
            self.sink.set_uniform(&format!("weights[{index}]"), value.as_uniform());
        }
        Ok(())
    }

    fn set_light_fields(&mut self, name: &str, value: &Light) {
        self.sink.set_uniform(&format!("{name}.color"), value.color.as_uniform());
        for (index, element) in value.w.iter().enumerate() {
            self.sink.set_uniform(&format!("{name}.w[{index}]"), element.as_uniform());
        }
    }
}
