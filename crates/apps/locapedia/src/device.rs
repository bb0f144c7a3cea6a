use engine::{DeviceLocator, LocateError};
use foundation::LatLon;
use streaming::BoxFuture;

/// Device position supplied on the command line.
#[derive(Debug, Clone, Copy)]
pub enum CliDevice {
    Fixed(LatLon),
    Denied,
    Absent,
}

impl CliDevice {
    pub fn from_args(lat: Option<f64>, lon: Option<f64>, deny: bool) -> Self {
        match (lat, lon) {
            _ if deny => Self::Denied,
            (Some(lat), Some(lon)) => Self::Fixed(LatLon::new(lat, lon)),
            _ => Self::Absent,
        }
    }
}

impl DeviceLocator for CliDevice {
    fn is_available(&self) -> bool {
        !matches!(self, Self::Absent)
    }

    fn current_position(&self) -> BoxFuture<'_, Result<LatLon, LocateError>> {
        let result = match *self {
            Self::Fixed(position) => Ok(position),
            Self::Denied => Err(LocateError::PermissionDenied),
            Self::Absent => Err(LocateError::Unavailable),
        };
        Box::pin(async move { result })
    }
}

#[cfg(test)]
mod tests {
    use super::CliDevice;
    use engine::DeviceLocator;

    #[test]
    fn deny_wins_over_coordinates() {
        let device = CliDevice::from_args(Some(1.0), Some(2.0), true);
        assert!(matches!(device, CliDevice::Denied));
        assert!(device.is_available());
    }

    #[test]
    fn half_a_coordinate_is_absent() {
        let device = CliDevice::from_args(Some(1.0), None, false);
        assert!(!device.is_available());
    }
}
