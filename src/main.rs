//! Example usage of the winapi-helpers library.

#[cfg(windows)]
fn main() -> winapi_helpers::error::Result<()> {
    use winapi_helpers::prelude::*;
    use winapi_helpers::special_path;

    println!("WinAPI Helpers Demo\n");

    println!("=== Partitions ===");
    let view = PortableView::native();
    for partition in view.enumerate() {
        println!(
            "{:<4} drive {:>2}  {:<16} {:<18} {:<8} {:<12} {}",
            partition.root,
            partition.drive_number,
            partition.placement,
            partition.disk_type,
            partition.filesystem_name,
            partition.volume_id,
            partition.volume_name,
        );
    }
    println!("Physical drives: {:?}", view.physical_drive_indices());
    println!("System drive: {}", PortableView::system_drive());
    println!();

    println!("=== System ===");
    let system = SystemInformation::collect();
    println!(
        "{} {} ({}), {} CPUs",
        system.os_name(),
        system.os_version(),
        system.cpu_architecture(),
        system.number_of_cpu()
    );
    let hardware = HardwareInformation::collect();
    println!("System volume ID: {}", hardware.volume_id());
    println!("CPU ID: {}", hardware.cpu_id());
    println!();

    println!("=== Process ===");
    println!("Current process ID: {}", winapi_helpers::process::current_pid());
    println!("Administrators group: {}", is_admin_mode()?);
    println!("Elevated: {}", is_elevated()?);
    println!();

    println!("=== User ===");
    let user = UserInformation::collect();
    println!("Name: {}", user.name());
    println!("Display name: {}", user.display_name());
    println!("SID: {}", user.sid());
    println!("Home: {}", user.home_path().unwrap_or("<none>"));
    if let Some(error) = user.last_error() {
        println!("Last error: {}", error);
    }
    println!();

    println!("=== Special Paths ===");
    println!("Windows: {}", special_path::windows());
    println!("Temp: {}", special_path::temp());
    println!("ProgramData: {}", special_path::common_appdata().unwrap_or_default());
    println!();

    println!("=== Registry ===");
    let key = RegistryKey::open(
        RootKey::LOCAL_MACHINE,
        r"SOFTWARE\Microsoft\Windows NT\CurrentVersion",
        true,
    )?;
    if let Some(name) = key.get_string("ProductName")? {
        println!("Windows Product: {}", name);
    }
    if let Some(build) = key.get_string("CurrentBuild")? {
        println!("Windows Build: {}", build);
    }
    println!();

    println!("=== Services ===");
    let scm = ServiceManager::connect(ScmAccess::READ)?;
    for name in ["EventLog", "Spooler"] {
        match scm.service_status(name) {
            Ok(state) => println!("{}: {:?}", name, state),
            Err(e) => println!("{}: {}", name, e),
        }
    }
    println!("SCM admin access: {}", ServiceManager::is_admin_access()?);

    Ok(())
}

#[cfg(not(windows))]
fn main() {
    println!("winapi-helpers: no native partition backend on this platform");
}
