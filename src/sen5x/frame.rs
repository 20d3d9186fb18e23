use std::fmt;

pub const FRAME_LEN: usize = 24;

/// One response of the read-measured-values command. Every field occupies a
/// big-endian word followed by a CRC byte, which is not checked.
pub type RawFrame = [u8; FRAME_LEN];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Pm1p0,
    Pm2p5,
    Pm4p0,
    Pm10p0,
    Humidity,
    Temperature,
    Voc,
    Nox,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldLayout {
    pub field: Field,

    /// Index of the high byte; the low byte follows it.
    pub offset: usize,

    pub scale: f32,
}

impl FieldLayout {
    const fn new(field: Field, offset: usize, scale: f32) -> Self {
        Self {
            field,
            offset,
            scale,
        }
    }

    pub fn raw(&self, frame: &RawFrame) -> u16 {
        u16::from_be_bytes([frame[self.offset], frame[self.offset + 1]])
    }

    pub fn decode(&self, frame: &RawFrame) -> f32 {
        self.raw(frame) as f32 / self.scale
    }
}

// Ref: Sensirion SEN5x datasheet, "Read Measured Values" (0x03C4)
pub const FRAME_LAYOUT: [FieldLayout; 8] = [
    FieldLayout::new(Field::Pm1p0, 0, 10.0),
    FieldLayout::new(Field::Pm2p5, 3, 10.0),
    FieldLayout::new(Field::Pm4p0, 6, 10.0),
    FieldLayout::new(Field::Pm10p0, 9, 10.0),
    FieldLayout::new(Field::Humidity, 12, 100.0),
    FieldLayout::new(Field::Temperature, 15, 200.0),
    FieldLayout::new(Field::Voc, 18, 10.0),
    FieldLayout::new(Field::Nox, 21, 10.0),
];

/// Physical values carried by one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Readings {
    pub pm1p0: f32,
    pub pm2p5: f32,
    pub pm4p0: f32,
    pub pm10p0: f32,
    pub voc: f32,
    pub nox: f32,
    pub temperature: f32,
    pub humidity: f32,
}

impl Readings {
    fn field_mut(&mut self, field: Field) -> &mut f32 {
        match field {
            Field::Pm1p0 => &mut self.pm1p0,
            Field::Pm2p5 => &mut self.pm2p5,
            Field::Pm4p0 => &mut self.pm4p0,
            Field::Pm10p0 => &mut self.pm10p0,
            Field::Humidity => &mut self.humidity,
            Field::Temperature => &mut self.temperature,
            Field::Voc => &mut self.voc,
            Field::Nox => &mut self.nox,
        }
    }
}

pub const READINGS_TABLE_HEADER: &str =
    "pm1p0 \t pm2p5 \t pm4p0 \t pm10p0\t voc \t nox \t temperature\t humidity";

impl fmt::Display for Readings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.2} \t {:.2} \t {:.2} \t {:.2} \t {:.0} \t {:.0} \t {:.2} \t\t {:.2}",
            self.pm1p0,
            self.pm2p5,
            self.pm4p0,
            self.pm10p0,
            self.voc,
            self.nox,
            self.temperature,
            self.humidity,
        )
    }
}

/// Decodes a frame using [`FRAME_LAYOUT`]. Total over all inputs: there is no
/// checksum validation, so garbage in yields garbage values out.
pub fn decode_frame(frame: &RawFrame) -> Readings {
    let mut readings = Readings::default();
    for layout in &FRAME_LAYOUT {
        *readings.field_mut(layout.field) = layout.decode(frame);
    }
    readings
}
