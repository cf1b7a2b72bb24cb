//! Fuente por registros: la IMU se interroga en cada poll
//!
//! MPU-6050 con la configuración de arranque del fabricante: acelerómetro a
//! ±2 g y giroscopio a ±250 °/s.

use super::{SampleSource, SourceError};
use crate::types::Sample;
use embedded_hal::i2c::I2c;
use std::thread;
use std::time::{Duration, Instant};

/// Dirección I2C por defecto (AD0 a masa)
pub const MPU6050_ADDRESS: u8 = 0x68;

const REG_PWR_MGMT_1: u8 = 0x6B;
const REG_ACCEL_XOUT_H: u8 = 0x3B;

const ACCEL_LSB_PER_G: f32 = 16384.0;
const GYRO_LSB_PER_DPS: f32 = 131.0;
const STANDARD_GRAVITY: f32 = 9.80665;

/// Dispositivo que entrega una muestra completa por lectura
pub trait ImuDevice {
    fn read_sample(&mut self) -> Result<Sample, SourceError>;
}

/// Driver mínimo del MPU-6050: aceleración en m/s², giro en °/s
pub struct Mpu6050<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C: I2c> Mpu6050<I2C> {
    /// Despierta el sensor (sale del modo sleep tras el reset)
    pub fn new(mut i2c: I2C, address: u8) -> Result<Self, SourceError> {
        i2c.write(address, &[REG_PWR_MGMT_1, 0x00])
            .map_err(|e| SourceError::Unavailable(format!("MPU-6050 wake-up failed: {:?}", e)))?;
        Ok(Self { i2c, address })
    }

    pub fn release(self) -> I2C {
        self.i2c
    }
}

impl<I2C: I2c> ImuDevice for Mpu6050<I2C> {
    fn read_sample(&mut self) -> Result<Sample, SourceError> {
        // ACCEL_X..Z (6), TEMP (2), GYRO_X..Z (6), big-endian
        let mut raw = [0u8; 14];
        self.i2c
            .write_read(self.address, &[REG_ACCEL_XOUT_H], &mut raw)
            .map_err(|e| SourceError::Transient(format!("{:?}", e)))?;

        let word = |i: usize| i16::from_be_bytes([raw[i], raw[i + 1]]) as f32;
        let accel = |i: usize| word(i) / ACCEL_LSB_PER_G * STANDARD_GRAVITY;
        let gyro = |i: usize| word(i) / GYRO_LSB_PER_DPS;

        Ok(Sample::new(
            accel(0),
            accel(2),
            accel(4),
            gyro(8),
            gyro(10),
            gyro(12),
        ))
    }
}

/// Fuente que interroga la IMU a intervalos fijos
pub struct PolledSource<D: ImuDevice> {
    device: D,
    interval: Duration,
    next_due: Option<Instant>,
}

impl<D: ImuDevice> PolledSource<D> {
    pub fn new(device: D, interval: Duration) -> Self {
        Self {
            device,
            interval,
            next_due: None,
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }
}

impl<D: ImuDevice> SampleSource for PolledSource<D> {
    fn poll(&mut self, timeout: Duration) -> Result<Option<Sample>, SourceError> {
        if let Some(due) = self.next_due {
            let now = Instant::now();
            if due > now {
                let wait = due - now;
                if wait > timeout {
                    thread::sleep(timeout);
                    return Ok(None);
                }
                thread::sleep(wait);
            }
        }

        self.next_due = Some(Instant::now() + self.interval);
        self.device.read_sample().map(Some)
    }
}

/// Abre el MPU-6050 en un bus I2C de Linux (p. ej. `/dev/i2c-1`)
#[cfg(feature = "linux-i2c")]
pub fn open_linux_mpu6050(
    bus: &str,
    address: u8,
    interval: Duration,
) -> Result<PolledSource<Mpu6050<linux_embedded_hal::I2cdev>>, SourceError> {
    let i2c = linux_embedded_hal::I2cdev::new(bus)
        .map_err(|e| SourceError::Unavailable(format!("{}: {}", bus, e)))?;
    let device = Mpu6050::new(i2c, address)?;
    log::info!("🔌 MPU-6050 en {} (0x{:02X})", bus, address);
    Ok(PolledSource::new(device, interval))
}
