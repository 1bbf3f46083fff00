//! Common types shared across device backends.

use serde::{Deserialize, Serialize};

/// Serial port as reported by the OS enumeration.
///
/// Everything except the name is optional: plain UART ports and many
/// virtual ports carry no descriptor strings at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortDescriptor {
    /// OS port name (e.g., "/dev/ttyUSB0", "COM3").
    pub name: String,

    /// Manufacturer string reported by the USB device.
    pub manufacturer: Option<String>,

    /// Product string reported by the USB device.
    pub product: Option<String>,

    /// USB vendor ID.
    pub vendor_id: Option<u16>,

    /// USB product ID.
    pub product_id: Option<u16>,
}

impl PortDescriptor {
    /// Create a descriptor with only a port name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            manufacturer: None,
            product: None,
            vendor_id: None,
            product_id: None,
        }
    }

    /// Set the manufacturer string.
    pub fn with_manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = Some(manufacturer.into());
        self
    }

    /// Set the product string.
    pub fn with_product(mut self, product: impl Into<String>) -> Self {
        self.product = Some(product.into());
        self
    }

    /// Set the USB vendor and product IDs.
    pub fn with_usb_ids(mut self, vendor_id: u16, product_id: u16) -> Self {
        self.vendor_id = Some(vendor_id);
        self.product_id = Some(product_id);
        self
    }

    /// Check whether any descriptor field contains one of `signatures`.
    ///
    /// Signatures are expected in lowercase. The vendor ID is compared in its
    /// 4-digit lowercase hex form.
    ///
    /// ```
    /// use tagbridge_hardware::PortDescriptor;
    ///
    /// let port = PortDescriptor::new("/dev/ttyUSB0").with_manufacturer("FTDI");
    /// assert!(port.matches_any(&["ftdi".to_string()]));
    ///
    /// let port = PortDescriptor::new("/dev/ttyACM0").with_usb_ids(0x0c2e, 0x0b61);
    /// assert!(port.matches_any(&["0c2e".to_string()]));
    /// ```
    pub fn matches_any(&self, signatures: &[String]) -> bool {
        let vendor = self.vendor_id.map(|vid| format!("{:04x}", vid));
        let fields = [
            self.manufacturer.as_deref().map(str::to_lowercase),
            self.product.as_deref().map(str::to_lowercase),
            vendor,
        ];

        fields.iter().flatten().any(|field| {
            signatures
                .iter()
                .any(|signature| !signature.is_empty() && field.contains(signature.as_str()))
        })
    }
}

impl std::fmt::Display for PortDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(manufacturer) = &self.manufacturer {
            write!(f, " ({})", manufacturer)?;
        }
        Ok(())
    }
}
