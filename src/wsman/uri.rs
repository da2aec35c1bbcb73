//! CIM class name -> WS-Management resource URI.

const DMTF_CIM_SCHEMA: &str = "http://schemas.dmtf.org/wbem/wscim/1/cim-schema/2/";
const INTEL_AMT_SCHEMA: &str = "http://intel.com/wbem/wscim/1/amt-schema/1/";
const INTEL_IPS_SCHEMA: &str = "http://intel.com/wbem/wscim/1/ips-schema/1/";

pub fn resource_uri(class: &str) -> String {
    let base = if class.starts_with("AMT_") {
        INTEL_AMT_SCHEMA
    } else if class.starts_with("IPS_") {
        INTEL_IPS_SCHEMA
    } else {
        DMTF_CIM_SCHEMA
    };
    format!("{}{}", base, class)
}
