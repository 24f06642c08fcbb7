//! Compute devices available to a run.

use crate::TrainBackend;
use burn::tensor::backend::Backend;

pub type Device = <TrainBackend as Backend>::Device;

/// Devices requested by ordinal and resolved against the compiled backend.
/// The first entry drives the training loop.
#[derive(Debug, Clone)]
pub struct DevicePool {
    devices: Vec<(usize, Device)>,
}

impl DevicePool {
    pub fn from_ordinals(ordinals: &[usize]) -> anyhow::Result<Self> {
        let mut devices: Vec<(usize, Device)> = Vec::new();
        for &ordinal in ordinals {
            if devices.iter().any(|(o, _)| *o == ordinal) {
                continue;
            }
            match device_for(ordinal) {
                Some(device) => devices.push((ordinal, device)),
                None => tracing::warn!(ordinal, "device ordinal not available on this backend; ignoring"),
            }
        }
        if devices.is_empty() {
            if !ordinals.is_empty() {
                anyhow::bail!("none of the requested devices {ordinals:?} exist on this backend");
            }
            devices.push((0, Device::default()));
        }
        Ok(Self { devices })
    }

    pub fn primary(&self) -> &Device {
        &self.devices[0].1
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn ordinals(&self) -> Vec<usize> {
        self.devices.iter().map(|(o, _)| *o).collect()
    }

    pub fn log_layout(&self) {
        let (ordinal, device) = &self.devices[0];
        tracing::info!(ordinal, device = ?device, "training device");
        for (ordinal, device) in &self.devices[1..] {
            tracing::info!(ordinal, device = ?device, "device idle: training loop is single-device");
        }
    }
}

/// Ordinals map straight to discrete adapters. Burn resolves the adapter when
/// the device is first used, so a missing GPU fails there, not here.
#[cfg(feature = "backend-wgpu")]
fn device_for(ordinal: usize) -> Option<Device> {
    Some(burn_wgpu::WgpuDevice::DiscreteGpu(ordinal))
}

#[cfg(not(feature = "backend-wgpu"))]
fn device_for(ordinal: usize) -> Option<Device> {
    (ordinal == 0).then_some(burn_ndarray::NdArrayDevice::Cpu)
}

#[cfg(all(test, not(feature = "backend-wgpu")))]
mod tests {
    use super::*;

    #[test]
    fn cpu_backend_keeps_only_ordinal_zero() {
        let pool = DevicePool::from_ordinals(&[0, 1, 0]).unwrap();
        assert_eq!(pool.ordinals(), vec![0]);
        assert_eq!(*pool.primary(), burn_ndarray::NdArrayDevice::Cpu);
    }

    #[test]
    fn empty_request_falls_back_to_default_device() {
        let pool = DevicePool::from_ordinals(&[]).unwrap();
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn only_missing_devices_is_an_error() {
        assert!(DevicePool::from_ordinals(&[3]).is_err());
    }
}
